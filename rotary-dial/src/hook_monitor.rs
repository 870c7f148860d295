//! Hook-switch debouncer.
//!
//! Implements deferred-confirmation debouncing: every edge stamps the time
//! and level last seen; a poll task watches for a quiet period and, once the
//! line has held steady for `debounce_time` and differs from the last
//! confirmed level, emits the transition. This rejects bounce bursts of
//! unbounded length at the cost of up to `debounce_time` of latency on real
//! transitions.
//!
//! The GPIO edge callback only ever takes a lock and stamps a timestamp: it
//! must stay synchronous, since on real hardware (`rotary_gpio::HardwareGpio`)
//! it runs on `rppal`'s own interrupt thread, not a Tokio worker, and
//! `tokio::spawn` from there would panic with no reactor running. All actual
//! waiting and event delivery happens on the poll task spawned once in
//! `start()`, the same structure the dial reader's pulse decoder uses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rotary_gpio::{Edge, GpioPort, Level, Pin, Pull};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE_TIME: Duration = Duration::from_millis(50);
/// Quiescence timer resolution.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A confirmed hook-switch transition. High = on-hook, low = off-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    OnPickup,
    OnHangup,
}

struct State {
    confirmed_level: Level,
    last_seen_level: Level,
    last_edge: Instant,
}

/// Watches a hook-switch GPIO pin and emits debounced [`HookEvent`]s.
pub struct HookMonitor {
    gpio: Arc<dyn GpioPort>,
    pin: Pin,
    poll_task: Option<JoinHandle<()>>,
}

impl HookMonitor {
    pub fn start(
        gpio: Arc<dyn GpioPort>,
        pin: Pin,
        debounce_time: Duration,
        events: mpsc::Sender<HookEvent>,
    ) -> Result<Self, rotary_gpio::GpioError> {
        gpio.configure_input(pin, Pull::Up)?;
        let initial = gpio.read(pin)?;

        let state = Arc::new(Mutex::new(State {
            confirmed_level: initial,
            last_seen_level: initial,
            last_edge: Instant::now(),
        }));

        let edge_state = state.clone();
        gpio.on_edge(
            pin,
            Edge::Both,
            Box::new(move |_pin, level| {
                let mut s = edge_state.lock();
                s.last_seen_level = level;
                s.last_edge = Instant::now();
            }),
        )?;

        let poll_state = state.clone();
        let poll_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let settled = {
                    let mut s = poll_state.lock();
                    if s.last_seen_level != s.confirmed_level && s.last_edge.elapsed() >= debounce_time {
                        s.confirmed_level = s.last_seen_level;
                        Some(s.confirmed_level)
                    } else {
                        None
                    }
                };
                if let Some(level) = settled {
                    let event = if level.is_high() {
                        HookEvent::OnHangup
                    } else {
                        HookEvent::OnPickup
                    };
                    if events.send(event).await.is_err() {
                        // Receiver gone; nothing left to report to.
                        break;
                    }
                }
            }
        });

        Ok(Self {
            gpio,
            pin,
            poll_task: Some(poll_task),
        })
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        let _ = self.gpio.remove_handler(self.pin);
    }
}

impl Drop for HookMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotary_gpio::MockGpio;

    #[tokio::test]
    async fn genuine_transition_emits_event_after_debounce() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _monitor =
            HookMonitor::start(gpio.clone(), 17, Duration::from_millis(20), tx).unwrap();

        gpio.set_level(17, Level::Low).unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event, HookEvent::OnPickup);
    }

    #[tokio::test]
    async fn bounce_shorter_than_debounce_produces_no_event() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _monitor =
            HookMonitor::start(gpio.clone(), 17, Duration::from_millis(50), tx).unwrap();

        // Rapid bounce back to the original (on-hook) level before the
        // debounce timer can fire: no event should ever arrive.
        gpio.set_level(17, Level::Low).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        gpio.set_level(17, Level::High).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(result.is_err(), "expected no event, got {:?}", result);
    }

    #[tokio::test]
    async fn pickup_then_hangup_round_trips() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _monitor =
            HookMonitor::start(gpio.clone(), 17, Duration::from_millis(10), tx).unwrap();

        gpio.set_level(17, Level::Low).unwrap();
        assert_eq!(rx.recv().await.unwrap(), HookEvent::OnPickup);

        gpio.set_level(17, Level::High).unwrap();
        assert_eq!(rx.recv().await.unwrap(), HookEvent::OnHangup);
    }
}
