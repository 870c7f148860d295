use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to decode waveform {path}: {reason}")]
    DecodeFailed { path: String, reason: String },
}

pub type AudioResult<T> = Result<T, AudioError>;

/// A single process-wide playback sink. Implemented by a real `rodio`-backed
/// device (`hardware` feature) and an in-memory mock used by every other
/// crate's tests, mirroring the real/mock split used throughout this
/// workspace for external hardware (see `rotary-gpio::MockGpio`).
///
/// `play` resolves once the waveform finishes; callers that need a time
/// budget race it against a timeout with `tokio::select!` rather than
/// expecting `play` itself to enforce one, so the same trait serves both the
/// ringer's cadenced loop and (eventually) call audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, path: &str) -> AudioResult<()>;
}
