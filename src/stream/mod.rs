//! Heart-rate stream ingestion
//!
//! Maintains the authenticated WebSocket connection to Pulsoid, decodes
//! heart-rate frames and hands each reading to a [`ReadingSink`].
//! Connection loss is handled by a bounded exponential backoff that ends
//! in a terminal state once its budget is spent.

mod backoff;
mod client;
mod frame;

pub use backoff::{ReconnectPolicy, ReconnectState};
pub use client::{ReadingSink, StreamClient, StreamClientConfig, StreamEvent, StreamState};
pub use frame::{parse_frame, HeartRateFrame};
