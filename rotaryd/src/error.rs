//! Exit-code classification for the process controller, per spec: `0` normal
//! shutdown, `1` configuration invalid, `2` hardware/audio unavailable, `3`
//! signalling stack fatal. Components below this binary return typed
//! `thiserror` results; this is the one place those get turned into a
//! process exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotarydError {
    #[error("configuration error: {0}")]
    Config(#[from] rotary_config::ConfigError),
    #[error("hardware initialization failed: {0}")]
    Hardware(String),
    #[error("signalling stack failed to start: {0}")]
    Signaling(String),
}

impl RotarydError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RotarydError::Config(_) => 1,
            RotarydError::Hardware(_) => 2,
            RotarydError::Signaling(_) => 3,
        }
    }
}

/// Walk an `anyhow::Error`'s cause chain for a `RotarydError`, so the exit
/// code reflects the original failure even after it's passed through several
/// layers of `.context(...)`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RotarydError>())
        .map(RotarydError::exit_code)
        .unwrap_or(1)
}
