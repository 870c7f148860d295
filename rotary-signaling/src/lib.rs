//! Signalling client abstraction for the rotary phone core: a single trait,
//! [`SignalingClient`], implemented by a real SIP/RTP-over-UDP backend
//! ([`sip::SipSignalingClient`]) and a deterministic in-memory simulator
//! ([`sim::SimulatedSignalingClient`]) used throughout the workspace's test
//! suites.

mod client;
pub mod sim;
pub mod sip;
mod types;

pub use client::SignalingClient;
pub use sim::SimulatedSignalingClient;
pub use sip::SipSignalingClient;
pub use types::{
    CallHandle, CallState, CallStateHandler, EndCause, IncomingHandler, SignalingError,
    SignalingResult, SipConfig, SipCredential,
};
