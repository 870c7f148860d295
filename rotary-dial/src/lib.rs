//! Pulse-dial digit decoding and hook-switch debouncing for the rotary phone
//! core. Both decoders run their timing-sensitive bookkeeping behind a short
//! critical section and dispatch their output (a digit, a hook event) through
//! a bounded channel so a slow call-manager input queue never blocks edge
//! intake.

mod dial_reader;
mod hook_monitor;

pub use dial_reader::{DialReader, DialTiming, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_PULSE_TIMEOUT};
pub use hook_monitor::{HookEvent, HookMonitor, DEFAULT_DEBOUNCE_TIME};
