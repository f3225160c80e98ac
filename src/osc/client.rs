//! UDP client that emits OSC avatar parameters

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::params::{Encoding, OscValue, HEART_RATE_PARAMS};
use crate::error::{Error, Result};
use crate::types::{ConnectionState, HeartRate};

/// Configuration for the OSC client
#[derive(Debug, Clone)]
pub struct OscClientConfig {
    /// Receiver host
    pub host: String,

    /// Receiver UDP port
    pub port: u16,

    /// Prepended to every parameter name
    pub parameter_prefix: String,

    /// Boolean liveness parameter
    pub status_parameter: String,

    /// Period of the liveness keepalive
    pub keepalive_interval: Duration,
}

impl Default for OscClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            parameter_prefix: "/avatar/parameters/".to_string(),
            status_parameter: "PulsoidConnected".to_string(),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

struct Transport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Transport {
    fn send(&self, address: String, args: Vec<OscType>) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: address.clone(),
            args,
        });
        let bytes = encoder::encode(&packet).map_err(|e| Error::OscEncode {
            address: address.clone(),
            message: e.to_string(),
        })?;

        self.socket
            .try_send_to(&bytes, self.target)
            .map_err(|source| Error::OscSend { address, source })?;
        Ok(())
    }
}

/// State shared with the keepalive task
struct Shared {
    config: OscClientConfig,
    /// `None` while disconnected; every send holds this lock
    transport: Mutex<Option<Transport>>,
    toggle: AtomicBool,
    last_heart_rate: Mutex<Option<HeartRate>>,
    send_failures: AtomicU64,
}

impl Shared {
    fn address(&self, name: &str) -> String {
        format!("{}{}", self.config.parameter_prefix, name)
    }

    fn emit(&self, transport: &Transport, name: &str, value: OscValue) -> Result<()> {
        let address = self.address(name);
        trace!(address = %address, value = ?value, "Sending OSC parameter");
        transport.send(address, vec![value.into()]).map_err(|e| {
            self.send_failures.fetch_add(1, Ordering::Relaxed);
            e
        })
    }

    fn send_status(&self, connected: bool) -> Result<()> {
        let transport = self.transport.lock();
        let transport = transport.as_ref().ok_or(Error::OscNotConnected)?;
        self.emit(transport, &self.config.status_parameter, OscValue::Bool(connected))
    }
}

/// OSC parameter emitter
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct OscClient {
    shared: Arc<Shared>,
    keepalive_stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl OscClient {
    pub fn new(config: OscClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport: Mutex::new(None),
                toggle: AtomicBool::new(false),
                last_heart_rate: Mutex::new(None),
                send_failures: AtomicU64::new(0),
            }),
            keepalive_stop: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OscClientConfig {
        &self.shared.config
    }

    /// Resolve the receiver, bind a local socket and start the keepalive
    ///
    /// Single attempt; a no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            debug!("OSC client already connected");
            return Ok(());
        }

        let config = &self.shared.config;
        let target = resolve(&config.host, config.port).await?;

        let bind_addr: SocketAddr = if target.is_ipv4() {
            ([0u8, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(|source| Error::OscBind {
            address: bind_addr.to_string(),
            source,
        })?;

        let local = socket.local_addr().ok();
        {
            let mut transport = self.shared.transport.lock();
            if transport.is_some() {
                return Ok(());
            }
            *transport = Some(Transport { socket, target });
        }

        info!(receiver = %target, local = ?local, "OSC client connected");
        self.start_keepalive();
        Ok(())
    }

    /// Stop the keepalive and release the socket. Safe to call repeatedly.
    pub fn disconnect(&self) {
        if let Some(stop) = self.keepalive_stop.lock().take() {
            let _ = stop.send(());
        }
        if self.shared.transport.lock().take().is_some() {
            info!(send_failures = self.send_failures(), "OSC client disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.transport.lock().is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Last reading forwarded without errors
    pub fn last_heart_rate(&self) -> Option<HeartRate> {
        *self.shared.last_heart_rate.lock()
    }

    /// Messages the socket refused since this client was created
    pub fn send_failures(&self) -> u64 {
        self.shared.send_failures.load(Ordering::Relaxed)
    }

    /// Emit every heart-rate parameter for one reading
    ///
    /// The whole batch goes out under one lock. A failed message does not
    /// stop the rest; the first failure is returned after the batch. The
    /// beat toggle only advances once its own message has been sent.
    pub fn send_heart_rate(&self, reading: HeartRate) -> Result<()> {
        let transport = self.shared.transport.lock();
        let Some(transport) = transport.as_ref() else {
            warn!(bpm = reading, "Cannot send heart rate, OSC client not connected");
            return Err(Error::OscNotConnected);
        };

        let toggle = self.shared.toggle.load(Ordering::SeqCst);
        let mut first_error = None;

        for param in &HEART_RATE_PARAMS {
            let value = param.value(reading, toggle);
            match self.shared.emit(transport, param.name, value) {
                Ok(()) => {
                    if param.encoding == Encoding::Toggle {
                        self.shared.toggle.store(!toggle, Ordering::SeqCst);
                    }
                }
                Err(e) => {
                    warn!(parameter = param.name, error = %e, "Failed to send OSC parameter");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                *self.shared.last_heart_rate.lock() = Some(reading);
                debug!(bpm = reading, toggle, "Heart rate sent over OSC");
                Ok(())
            }
        }
    }

    /// Emit the liveness parameter; a logged no-op while disconnected
    pub fn send_connection_status(&self, connected: bool) -> Result<()> {
        match self.shared.send_status(connected) {
            Err(Error::OscNotConnected) => {
                debug!(connected, "Skipping connection status, OSC client not connected");
                Ok(())
            }
            Err(e) => {
                warn!(connected, error = %e, "Failed to send connection status");
                Err(e)
            }
            Ok(()) => {
                debug!(connected, "Connection status sent");
                Ok(())
            }
        }
    }

    /// Emit a single parameter outside the heart-rate table
    pub fn send_custom_parameter(&self, name: &str, value: impl Into<OscValue>) -> Result<()> {
        let transport = self.shared.transport.lock();
        let Some(transport) = transport.as_ref() else {
            warn!(parameter = name, "Cannot send parameter, OSC client not connected");
            return Err(Error::OscNotConnected);
        };
        self.shared.emit(transport, name, value.into())
    }

    fn start_keepalive(&self) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        if let Some(previous) = self.keepalive_stop.lock().replace(stop_tx) {
            let _ = previous.send(());
        }

        let shared = self.shared.clone();
        let period = shared.config.keepalive_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match shared.send_status(true) {
                            Ok(()) => trace!("Keepalive sent"),
                            Err(Error::OscNotConnected) => break,
                            Err(e) => warn!(error = %e, "Keepalive send failed"),
                        }
                    }
                }
            }
            debug!("Keepalive task stopped");
        });
    }
}

impl Drop for OscClient {
    fn drop(&mut self) {
        if let Some(stop) = self.keepalive_stop.get_mut().take() {
            let _ = stop.send(());
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let resolution_error = |message: String| Error::OscAddressResolution {
        host: host.to_string(),
        port,
        message,
    };

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| resolution_error(e.to_string()))?
        .next()
        .ok_or_else(|| resolution_error("no addresses found".to_string()))
}
