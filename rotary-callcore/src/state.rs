use thiserror::Error;

/// The eight-variant phone state. `Error` carries no payload itself; the
/// human-readable message that goes with it travels on the domain event
/// bus's `PhoneStateChanged` event's `error` field instead, since the state
/// alphabet itself is fixed by the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneState {
    Idle,
    OffHookWaiting,
    Dialing,
    Validating,
    Calling,
    Ringing,
    Connected,
    Error,
}

impl PhoneState {
    pub fn label(&self) -> &'static str {
        match self {
            PhoneState::Idle => "Idle",
            PhoneState::OffHookWaiting => "OffHookWaiting",
            PhoneState::Dialing => "Dialing",
            PhoneState::Validating => "Validating",
            PhoneState::Calling => "Calling",
            PhoneState::Ringing => "Ringing",
            PhoneState::Connected => "Connected",
            PhoneState::Error => "Error",
        }
    }
}

/// Invariant violations: an illegal transition was attempted. Per the core's
/// error taxonomy this is a programmer error and must abort loudly rather
/// than be absorbed.
#[derive(Debug, Error)]
pub enum CallCoreError {
    #[error("illegal transition: {event} while in state {state:?}")]
    IllegalTransition { state: PhoneState, event: &'static str },
}
