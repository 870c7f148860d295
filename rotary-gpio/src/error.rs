use thiserror::Error;

use crate::Pin;

/// Errors raised by a [`GpioPort`](crate::GpioPort) implementation.
///
/// These are contract violations (class 7 in the core's error taxonomy) or
/// startup-time hardware failures (class 3) — never the transient bounces a
/// debouncer is meant to absorb.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpioError {
    #[error("pin {0} was never configured as an input or output")]
    PinUnconfigured(Pin),

    #[error("pin {pin} is configured as {configured}, operation requires {required}")]
    DirectionMismatch {
        pin: Pin,
        configured: &'static str,
        required: &'static str,
    },

    #[error("hardware GPIO unavailable: {0}")]
    HardwareUnavailable(String),
}

pub type GpioResult<T> = Result<T, GpioError>;
