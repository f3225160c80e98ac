//! WebSocket client for the Pulsoid real-time heart-rate stream
//!
//! Provides a resilient ingestion client with:
//! - Bearer-token authenticated connection with a bounded connect timeout
//! - Protocol-level ping/pong liveness checking
//! - Bounded exponential backoff, ending in a terminal `Stopped` state
//! - Fault isolation around the reading consumer

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};

use super::backoff::{ReconnectPolicy, ReconnectState};
use super::frame::parse_frame;
use crate::config::DEFAULT_STREAM_URL;
use crate::error::{Error, Result};
use crate::types::{ConnectionState, HeartRate};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the stream client
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL of the real-time endpoint
    pub url: String,

    /// Bound on TCP connect + TLS + upgrade
    pub connect_timeout: Duration,

    /// Interval between protocol pings
    pub ping_interval: Duration,

    /// Time allowed for the matching pong
    pub ping_timeout: Duration,

    /// Reconnection policy
    pub policy: ReconnectPolicy,

    /// Capacity of the event channel
    pub event_queue_size: usize,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            policy: ReconnectPolicy::default(),
            event_queue_size: 64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Consumer Interface
// ─────────────────────────────────────────────────────────────────

/// Receives every reading decoded from the stream
///
/// Called synchronously from the listen loop, so implementations must
/// return quickly. Errors and panics are logged and otherwise ignored.
pub trait ReadingSink: Send + Sync {
    fn on_reading(&self, reading: HeartRate) -> Result<()>;
}

impl<F> ReadingSink for F
where
    F: Fn(HeartRate) -> Result<()> + Send + Sync,
{
    fn on_reading(&self, reading: HeartRate) -> Result<()> {
        self(reading)
    }
}

// ─────────────────────────────────────────────────────────────────
// State & Events
// ─────────────────────────────────────────────────────────────────

/// Position in the connect/listen/reconnect state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not started
    #[default]
    Idle,
    /// Opening the WebSocket
    Connecting,
    /// Connected and reading frames
    Listening,
    /// Waiting before the next attempt
    Backoff,
    /// Terminal; no further attempts
    Stopped,
}

impl StreamState {
    pub fn connection_state(self) -> ConnectionState {
        match self {
            StreamState::Connecting => ConnectionState::Connecting,
            StreamState::Listening => ConnectionState::Connected,
            StreamState::Idle | StreamState::Backoff | StreamState::Stopped => {
                ConnectionState::Disconnected
            }
        }
    }
}

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Connection established
    Connected,

    /// Established connection was lost
    Disconnected { reason: String },

    /// Waiting `delay` before attempt number `attempt`
    Reconnecting { attempt: u32, delay: Duration },

    /// Retry budget spent
    Exhausted { attempts: u32 },

    /// Stopped on request
    Stopped,
}

struct ClientState {
    stream_state: StreamState,
    reconnect: ReconnectState,
    readings: u64,
}

enum ListenOutcome {
    /// `stop()` was called
    Stopped,
    /// Connection dropped; always `Error::ConnectionLost`
    Lost(Error),
}

fn lost(message: impl Into<String>) -> ListenOutcome {
    ListenOutcome::Lost(Error::ConnectionLost {
        message: message.into(),
    })
}

// ─────────────────────────────────────────────────────────────────
// Stream Client
// ─────────────────────────────────────────────────────────────────

/// Ingestion client for the heart-rate stream
pub struct StreamClient {
    config: StreamClientConfig,
    state: Arc<RwLock<ClientState>>,
    stop_tx: watch::Sender<bool>,
    event_tx: mpsc::Sender<StreamEvent>,
    event_rx: Option<mpsc::Receiver<StreamEvent>>,
}

impl StreamClient {
    /// Create a new stream client
    pub fn new(config: StreamClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size.max(1));
        let (stop_tx, _) = watch::channel(false);
        let reconnect = ReconnectState::new(config.policy.clone());

        Self {
            config,
            state: Arc::new(RwLock::new(ClientState {
                stream_state: StreamState::Idle,
                reconnect,
                readings: 0,
            })),
            stop_tx,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver; returns `None` after the first call
    pub fn events(&mut self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.event_rx.take()
    }

    pub fn state(&self) -> StreamState {
        self.state.read().stream_state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state().connection_state()
    }

    /// Attempts taken in the current failure streak
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.read().reconnect.attempts()
    }

    /// Readings decoded since the client was created
    pub fn readings_received(&self) -> u64 {
        self.state.read().readings
    }

    /// Request termination
    ///
    /// Closes the open socket, interrupts a pending backoff sleep and
    /// suppresses any further attempt. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!("Stopping heart-rate stream client");
        }
    }

    /// Run the connect/listen/reconnect loop until stopped
    ///
    /// Returns `Ok(())` after `stop()`, or `Error::ReconnectExhausted`
    /// once the retry budget is spent.
    pub async fn run(&self, token: &str, sink: Arc<dyn ReadingSink>) -> Result<()> {
        let mut stop_rx = self.stop_tx.subscribe();

        // Malformed URL or token fails now rather than once per attempt.
        self.build_request(token)?;

        loop {
            if *stop_rx.borrow() {
                break;
            }

            self.set_state(StreamState::Connecting);
            info!(url = %self.config.url, "Connecting to heart-rate stream");

            let connected = tokio::select! {
                result = self.connect(token) => result,
                _ = stopped(&mut stop_rx) => break,
            };

            match connected {
                Ok(ws) => {
                    {
                        let mut s = self.state.write();
                        s.reconnect.reset();
                        s.stream_state = StreamState::Listening;
                    }
                    info!("Heart-rate stream connected");
                    self.emit(StreamEvent::Connected);

                    match self.listen(ws, sink.as_ref(), &mut stop_rx).await {
                        ListenOutcome::Stopped => break,
                        ListenOutcome::Lost(e) => {
                            warn!(error = %e, "Heart-rate stream disconnected");
                            self.emit(StreamEvent::Disconnected { reason: e.to_string() });
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to heart-rate stream");
                }
            }

            let (next, attempts, max) = {
                let mut s = self.state.write();
                let next = s.reconnect.next_attempt();
                s.stream_state = if next.is_some() {
                    StreamState::Backoff
                } else {
                    StreamState::Stopped
                };
                (next, s.reconnect.attempts(), s.reconnect.policy().max_attempts)
            };

            let Some(delay) = next else {
                error!(attempts, max, "Max reconnection attempts reached, giving up");
                self.emit(StreamEvent::Exhausted { attempts });
                return Err(Error::ReconnectExhausted { attempts });
            };

            info!(
                attempt = attempts,
                max,
                delay_ms = delay.as_millis() as u64,
                "Waiting before reconnection"
            );
            self.emit(StreamEvent::Reconnecting {
                attempt: attempts,
                delay,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(&mut stop_rx) => break,
            }
        }

        self.set_state(StreamState::Stopped);
        self.emit(StreamEvent::Stopped);
        info!("Heart-rate stream client stopped");
        Ok(())
    }

    fn build_request(&self, token: &str) -> Result<Request> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| Error::auth("token contains characters not allowed in a header"))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }

    async fn connect(&self, token: &str) -> Result<WsStream> {
        let request = self.build_request(token)?;
        let url = &self.config.url;

        match tokio::time::timeout(self.config.connect_timeout, connect_async(request)).await {
            Ok(Ok((ws, response))) => {
                debug!(status = %response.status(), "WebSocket handshake complete");
                Ok(ws)
            }
            Ok(Err(WsError::Http(response)))
                if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
            {
                warn!(status = %response.status(), "Stream rejected the access token");
                Err(Error::auth(format!("server answered {}", response.status())))
            }
            Ok(Err(e)) => Err(Error::connection_failed(url, e.to_string())),
            Err(_) => Err(Error::ConnectionTimeout {
                url: url.clone(),
                timeout_ms: self.config.connect_timeout.as_millis() as u64,
            }),
        }
    }

    /// Read frames until the connection drops or a stop is requested
    async fn listen(
        &self,
        ws: WsStream,
        sink: &dyn ReadingSink,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> ListenOutcome {
        let (mut write, mut read) = ws.split();

        let ping_interval = self.config.ping_interval;
        let mut ping_timer = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = stopped(stop_rx) => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return ListenOutcome::Stopped;
                }

                _ = ping_timer.tick() => {
                    if pong_deadline.is_none() {
                        if let Err(e) = write.send(WsMessage::Ping(Vec::new())).await {
                            return lost(format!("ping failed: {}", e));
                        }
                        pong_deadline = Some(Instant::now() + self.config.ping_timeout);
                        trace!("Sent ping");
                    }
                }

                _ = pong_timeout(pong_deadline) => {
                    return lost(format!(
                        "no pong within {}ms",
                        self.config.ping_timeout.as_millis()
                    ));
                }

                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_bytes(), sink),
                    Some(Ok(WsMessage::Binary(data))) => self.dispatch(&data, sink),
                    Some(Ok(WsMessage::Ping(data))) => {
                        if let Err(e) = write.send(WsMessage::Pong(data)).await {
                            return lost(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        trace!("Received pong");
                        pong_deadline = None;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(frame = ?frame, "Received close frame");
                        return lost("closed by server");
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => return lost(e.to_string()),
                    None => return lost("stream ended"),
                }
            }
        }
    }

    fn dispatch(&self, payload: &[u8], sink: &dyn ReadingSink) {
        match parse_frame(payload) {
            Ok(Some(frame)) => {
                debug!(
                    bpm = frame.heart_rate,
                    measured_at = ?frame.measured_at,
                    "Heart rate received"
                );
                self.state.write().readings += 1;
                deliver(sink, frame.heart_rate);
            }
            Ok(None) => {
                debug!(payload = %String::from_utf8_lossy(payload), "Ignoring frame without heart rate");
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
            }
        }
    }

    fn set_state(&self, stream_state: StreamState) {
        self.state.write().stream_state = stream_state;
    }

    /// Never blocks the loop; events are dropped when nobody keeps up
    fn emit(&self, event: StreamEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            trace!(event = ?event, "Event queue full, dropping event");
        }
    }
}

/// Hand a reading to the consumer without letting it take the loop down
fn deliver(sink: &dyn ReadingSink, reading: HeartRate) {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.on_reading(reading))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(bpm = reading, error = %e, "Reading consumer failed"),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(bpm = reading, panic = %message, "Reading consumer panicked");
        }
    }
}

/// Resolves once a stop has been requested
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    // The sender lives inside the client, so an error cannot outlive it.
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

async fn pong_timeout(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
