//! Domain event bus and call-log persistence for the rotary phone core.
//!
//! [`EventBus`] is a bounded, single-writer, multi-reader broadcast channel:
//! the call manager is its sole publisher. [`sink::PersistenceSink`]
//! subscribes and owns the authoritative SQLite call log; [`push::PushForwarder`]
//! optionally relays the same stream to an out-of-process consumer.

mod bus;
mod error;
mod push;
mod sink;
mod types;

pub use bus::{EventBus, EventSubscriber, DEFAULT_CAPACITY};
pub use error::{EventsError, EventsResult};
pub use push::PushForwarder;
pub use sink::{CallStats, PersistenceQuery, PersistenceSink};
pub use types::{
    CallRecord, CallStatus, CloseCallRecord, Direction, DomainEvent, NewCallRecord,
    PhoneStateLabel,
};
