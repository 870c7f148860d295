//! Shared data types for the call log and the domain event stream: the call
//! manager is the sole producer of [`DomainEvent`]s, the persistence sink the
//! authoritative consumer of [`CallRecord`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "Inbound",
            Direction::Outbound => "Outbound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Inbound" => Some(Direction::Inbound),
            "Outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Completed,
    Missed,
    Failed,
    Rejected,
    InProgress,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Completed => "Completed",
            CallStatus::Missed => "Missed",
            CallStatus::Failed => "Failed",
            CallStatus::Rejected => "Rejected",
            CallStatus::InProgress => "InProgress",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Completed" => Some(CallStatus::Completed),
            "Missed" => Some(CallStatus::Missed),
            "Failed" => Some(CallStatus::Failed),
            "Rejected" => Some(CallStatus::Rejected),
            "InProgress" => Some(CallStatus::InProgress),
            _ => None,
        }
    }
}

/// One call-log row. Append-only except for the single terminal update that
/// closes `status`/`duration_seconds` on an `InProgress` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub status: CallStatus,
    pub caller_id: Option<String>,
    pub dialed_number: Option<String>,
    pub destination: Option<String>,
    pub speed_dial_code: Option<String>,
    pub duration_seconds: i64,
    pub error_message: Option<String>,
}

/// Fields needed to open a new call-log row. `id`/`timestamp` are assigned by
/// the persistence sink at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCallRecord {
    pub direction: Direction,
    pub caller_id: Option<String>,
    pub dialed_number: Option<String>,
    pub destination: Option<String>,
    pub speed_dial_code: Option<String>,
}

/// Fields needed to close the single in-progress row.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseCallRecord {
    pub status: CallStatus,
    pub duration_seconds: i64,
    pub error_message: Option<String>,
}

/// A state the call manager's `PhoneState` can be in, for the purposes of
/// [`DomainEvent::PhoneStateChanged`]. Kept as an opaque label here (rather
/// than depending on `rotary-callcore`) so the event/persistence layer has no
/// dependency on the state machine's crate.
pub type PhoneStateLabel = String;

impl NewCallRecord {
    /// Build the [`DomainEvent::CallStarted`] event for this record. `number`
    /// is the destination for outbound calls, the caller id for inbound.
    pub fn into_event(self, record_id: i64) -> DomainEvent {
        let number = match self.direction {
            Direction::Outbound => self.destination.clone().unwrap_or_default(),
            Direction::Inbound => self.caller_id.clone().unwrap_or_default(),
        };
        DomainEvent::CallStarted {
            record_id,
            direction: self.direction,
            number,
            caller_id: self.caller_id,
            dialed_number: self.dialed_number,
            destination: self.destination,
            speed_dial_code: self.speed_dial_code,
        }
    }
}

impl CloseCallRecord {
    pub fn into_event(self, record_id: i64) -> DomainEvent {
        DomainEvent::CallEnded {
            record_id,
            status: self.status,
            duration_seconds: self.duration_seconds,
            error_message: self.error_message,
        }
    }
}

/// Events published by the call manager, in emission order, to every bus
/// subscriber (the persistence sink and, optionally, an out-of-process push
/// channel).
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    PhoneStateChanged {
        old: PhoneStateLabel,
        new: PhoneStateLabel,
        current_number: Option<String>,
        error: Option<String>,
    },
    CallStarted {
        record_id: i64,
        direction: Direction,
        /// The number associated with this call at a glance: the resolved
        /// destination for outbound calls, the caller id for inbound ones.
        number: String,
        caller_id: Option<String>,
        dialed_number: Option<String>,
        destination: Option<String>,
        speed_dial_code: Option<String>,
    },
    CallEnded {
        record_id: i64,
        status: CallStatus,
        duration_seconds: i64,
        error_message: Option<String>,
    },
    DigitDialed {
        digit: u8,
        number_so_far: String,
    },
    CallLogUpdated {
        record_id: i64,
    },
    ConfigChanged {
        section: String,
    },
}
