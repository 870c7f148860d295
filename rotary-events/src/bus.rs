//! Bounded, single-writer, multi-reader domain event bus.
//!
//! The call manager is the bus's sole publisher. Subscribers that fall
//! behind are never allowed to block it: a lagging receiver simply skips the
//! events it missed (`broadcast::error::RecvError::Lagged`), logs a warning,
//! and resumes from the next one.

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::DomainEvent;

/// Default channel depth. Generous relative to the event rate of a single
/// phone line; a subscriber that falls this far behind is almost certainly
/// stuck rather than merely busy.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to every current subscriber. Never blocks; if there are no
    /// subscribers the event is simply dropped.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

/// A bus subscription. Wraps the raw `broadcast::Receiver` so lag handling
/// (skip and warn, never block or error out the caller) lives in one place.
pub struct EventSubscriber {
    rx: broadcast::Receiver<DomainEvent>,
}

impl EventSubscriber {
    /// Await the next event, transparently skipping over any the subscriber
    /// lagged behind on. Returns `None` once the bus itself is gone.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, dropping skipped events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallStatus, Direction};

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();

        bus.publish(DomainEvent::CallStarted {
            record_id: 1,
            direction: Direction::Outbound,
            number: "+15551234567".into(),
            caller_id: None,
            dialed_number: Some("1".into()),
            destination: Some("+15551234567".into()),
            speed_dial_code: Some("1".into()),
        });
        bus.publish(DomainEvent::CallEnded {
            record_id: 1,
            status: CallStatus::Completed,
            duration_seconds: 12,
            error_message: None,
        });

        assert!(matches!(sub.recv().await, Some(DomainEvent::CallStarted { .. })));
        assert!(matches!(sub.recv().await, Some(DomainEvent::CallEnded { .. })));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_rather_than_blocks_publisher() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..10 {
            bus.publish(DomainEvent::ConfigChanged {
                section: format!("section-{i}"),
            });
        }

        // The publisher never blocked; the subscriber resumes past the lag.
        assert!(sub.recv().await.is_some());
    }
}
