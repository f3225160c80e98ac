//! OSC emission to VRChat
//!
//! Each heart-rate reading becomes a fixed batch of avatar parameter
//! messages sent over UDP, alongside a periodic liveness parameter.

mod client;
mod params;

pub use client::{OscClient, OscClientConfig};
pub use params::OscValue;
