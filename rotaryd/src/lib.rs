//! Library half of `rotaryd`, the process controller binary: wiring,
//! configuration, signal handling, and exit-code classification, kept
//! separate from `main.rs` so the integration test suite can drive
//! [`controller::Controller`] directly against mock/simulated backends.

pub mod cli;
pub mod controller;
pub mod error;
pub mod logging;
pub mod signals;
