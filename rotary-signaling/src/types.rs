use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Opaque handle to a single in-flight or completed call, stable for the
/// lifetime of that call across both signalling client implementations.
pub type CallHandle = Uuid;

/// The reason a call reached `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Normal,
    Busy,
    NoAnswer,
    Rejected,
    NetworkError,
}

/// Per-call lifecycle state, as observed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Initiating,
    Ringing,
    EarlyMedia,
    Answered,
    Connected,
    Ended(EndCause),
}

#[derive(Debug, Error, Clone)]
pub enum SignalingError {
    #[error("registration failed: {reason}")]
    RegistrationFailed { reason: String },
    #[error("a call is already in progress")]
    Busy,
    #[error("no such call")]
    NotFound,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("signalling client is shutting down")]
    ShuttingDown,
}

pub type SignalingResult<T> = Result<T, SignalingError>;

/// Configuration for the real SIP/RTP backend. Mirrors the `sip` section of
/// the core's configuration document; the credential is never included in
/// `Debug` output (see its hand-written impl below).
#[derive(Clone)]
pub struct SipConfig {
    pub server_host: String,
    pub server_port: u16,
    pub user: String,
    pub credential: SipCredential,
    pub local_port: u16,
    pub register_interval: Duration,
    pub registration_timeout: Duration,
}

/// A SIP account password. Deliberately opaque in `Debug`/logs, per the
/// core's rule that secrets never appear in logs or events.
#[derive(Clone)]
pub struct SipCredential(pub String);

impl std::fmt::Debug for SipCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SipCredential(***)")
    }
}

impl std::fmt::Debug for SipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SipConfig")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("user", &self.user)
            .field("credential", &self.credential)
            .field("local_port", &self.local_port)
            .field("register_interval", &self.register_interval)
            .field("registration_timeout", &self.registration_timeout)
            .finish()
    }
}

/// Callback invoked when an inbound call arrives: handle plus caller identity.
pub type IncomingHandler = Box<dyn Fn(CallHandle, String) + Send + Sync>;
/// Callback invoked on every call-lifecycle transition for the local view of
/// a call.
pub type CallStateHandler = Box<dyn Fn(CallHandle, CallState) + Send + Sync>;
