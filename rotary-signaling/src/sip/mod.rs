mod client;
mod digest;
mod message;

pub use client::SipSignalingClient;
