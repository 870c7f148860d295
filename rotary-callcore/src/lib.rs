//! The call-state machine: the heart of the rotary phone core. Coordinates
//! the dial reader, hook monitor, ringer, and signalling client, applies
//! dialling policy (speed-dial, allow-list), and is the domain event bus's
//! sole publisher.

mod manager;
mod policy;
mod state;

pub use manager::{
    build, CallCoreConfig, CallManager, CallManagerHandle, ConfigReload,
    DEFAULT_CALL_ATTEMPT_TIMEOUT, DEFAULT_INTER_DIGIT_TIMEOUT,
};
pub use policy::{resolve_destination, Resolution};
pub use state::{CallCoreError, PhoneState};
