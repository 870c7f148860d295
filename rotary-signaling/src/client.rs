use async_trait::async_trait;

use crate::types::{CallHandle, CallStateHandler, IncomingHandler, SignalingResult};

/// Abstract registration + call-lifecycle contract the call manager drives.
/// Two implementations: [`crate::sip::SipSignalingClient`] (real SIP/RTP over
/// UDP) and [`crate::sim::SimulatedSignalingClient`] (deterministic, used by
/// the test suite).
///
/// Only one active call is permitted at a time; a second [`place_call`]
/// while one is in flight fails with [`crate::SignalingError::Busy`].
///
/// [`place_call`]: SignalingClient::place_call
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Idempotent: returns once a terminal registration status is known or
    /// the registration timeout elapses.
    async fn register(&self) -> SignalingResult<()>;

    /// Start an outbound call. Returns immediately; progress is reported
    /// through the handler registered with [`on_call_state`](Self::on_call_state).
    async fn place_call(&self, destination: &str) -> SignalingResult<CallHandle>;

    async fn answer(&self, call: CallHandle) -> SignalingResult<()>;
    async fn reject(&self, call: CallHandle) -> SignalingResult<()>;
    async fn hangup(&self, call: CallHandle) -> SignalingResult<()>;

    /// Register the callback invoked when an inbound call arrives. Replaces
    /// any previously registered handler.
    fn on_incoming(&self, handler: IncomingHandler);

    /// Register the callback invoked on every call-lifecycle transition.
    /// Replaces any previously registered handler.
    fn on_call_state(&self, handler: CallStateHandler);

    /// Cancel registration, terminate all calls, release audio/network
    /// resources. Safe to call more than once.
    async fn shutdown(&self) -> SignalingResult<()>;
}
