//! Bridge orchestration
//!
//! Wires the stream client to the OSC client and owns the run lifecycle:
//! token → OSC connect → status on → stream loop → status off → OSC disconnect.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::TokenProvider;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::osc::{OscClient, OscClientConfig};
use crate::stream::{ReadingSink, StreamClient, StreamClientConfig, StreamEvent};
use crate::types::HeartRate;

/// Forwards every reading to the OSC client
pub struct OscForwarder {
    osc: Arc<OscClient>,
}

impl OscForwarder {
    pub fn new(osc: Arc<OscClient>) -> Self {
        Self { osc }
    }
}

impl ReadingSink for OscForwarder {
    fn on_reading(&self, reading: HeartRate) -> Result<()> {
        info!(bpm = reading, "Heart rate");
        self.osc.send_heart_rate(reading)
    }
}

/// Heart-rate stream to OSC bridge
pub struct Bridge {
    stream: Arc<StreamClient>,
    osc: Arc<OscClient>,
    events: Option<mpsc::Receiver<StreamEvent>>,
}

impl Bridge {
    pub fn new(stream_config: StreamClientConfig, osc_config: OscClientConfig) -> Self {
        let mut stream = StreamClient::new(stream_config);
        let events = stream.events();

        Self {
            stream: Arc::new(stream),
            osc: Arc::new(OscClient::new(osc_config)),
            events,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.stream_client_config(), config.osc_client_config())
    }

    /// Run until `shutdown` resolves or the stream gives up
    ///
    /// Returns the stream's terminal error, if any. Once the OSC client is
    /// connected, the status-off message and disconnect always happen.
    pub async fn run<P, S>(&mut self, provider: &P, shutdown: S) -> Result<()>
    where
        P: TokenProvider + ?Sized,
        S: Future<Output = ()>,
    {
        let token = provider.get_valid_token().await?;

        self.osc.connect().await?;
        if let Err(e) = self.osc.send_connection_status(true) {
            warn!(error = %e, "Failed to announce connection status");
        }

        info!(
            osc_target = %format!("{}:{}", self.osc.config().host, self.osc.config().port),
            "Bridge started, waiting for heart-rate data"
        );

        let sink: Arc<dyn ReadingSink> = Arc::new(OscForwarder::new(self.osc.clone()));
        let stream = self.stream.clone();
        let run = stream.run(&token, sink);
        tokio::pin!(run);
        tokio::pin!(shutdown);

        let mut events = self.events.take();
        let mut stopping = false;

        let result = loop {
            tokio::select! {
                result = &mut run => break result,

                _ = &mut shutdown, if !stopping => {
                    info!("Shutdown requested");
                    stopping = true;
                    self.stream.stop();
                }

                Some(event) = next_event(&mut events) => log_event(&event),
            }
        };

        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                log_event(&event);
            }
        }

        self.teardown();

        if let Err(ref e) = result {
            error!(error = %e.format_for_log(), "Bridge stopped with error");
        }
        result
    }

    fn teardown(&self) {
        if let Err(e) = self.osc.send_connection_status(false) {
            warn!(error = %e, "Failed to announce disconnection");
        }
        self.osc.disconnect();
        info!(
            readings = self.stream.readings_received(),
            last_bpm = ?self.osc.last_heart_rate(),
            "Bridge stopped"
        );
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<StreamEvent>>) -> Option<StreamEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_event(event: &StreamEvent) {
    match event {
        StreamEvent::Connected => debug!("Stream event: connected"),
        StreamEvent::Disconnected { reason } => debug!(reason = %reason, "Stream event: disconnected"),
        StreamEvent::Reconnecting { attempt, delay } => debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Stream event: reconnecting"
        ),
        StreamEvent::Exhausted { attempts } => debug!(attempts, "Stream event: exhausted"),
        StreamEvent::Stopped => debug!("Stream event: stopped"),
    }
}
