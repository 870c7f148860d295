//! Rotary pulse-dial decoder.
//!
//! Implements the pulse-accumulation-with-quiescence-timeout algorithm: each
//! falling edge on the pulse line bumps a counter; a coarse timer watches for
//! a quiet period and, once one is observed, emits `count mod 10` as the
//! dialled digit (ten pulses aliasing to `0`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rotary_gpio::{Edge, GpioPort, Pin, Pull};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default quiescence window after the last pulse before a digit is emitted.
pub const DEFAULT_PULSE_TIMEOUT: Duration = Duration::from_millis(300);
/// Default minimum spacing between pulses; closer edges are noise.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(10);
/// Quiescence timer resolution. Spec requires <= 50ms.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct DialTiming {
    pub pulse_timeout: Duration,
    pub debounce_window: Duration,
}

impl Default for DialTiming {
    fn default() -> Self {
        Self {
            pulse_timeout: DEFAULT_PULSE_TIMEOUT,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

struct Accumulator {
    count: u32,
    last_edge: Instant,
    active: bool,
}

/// Decodes rotary dial pulses on a single GPIO pin into decimal digits,
/// delivered on a bounded channel so a slow downstream consumer applies
/// backpressure rather than letting digits pile up unbounded.
pub struct DialReader {
    gpio: Arc<dyn GpioPort>,
    pin: Pin,
    acc: Arc<Mutex<Accumulator>>,
    poll_task: Option<JoinHandle<()>>,
}

impl DialReader {
    /// Configure `pin` as a pulled-up input and start watching it.
    /// `digits` receives each decoded digit (`0..=9`) in emission order.
    pub fn start(
        gpio: Arc<dyn GpioPort>,
        pin: Pin,
        timing: DialTiming,
        digits: mpsc::Sender<u8>,
    ) -> Result<Self, rotary_gpio::GpioError> {
        gpio.configure_input(pin, Pull::Up)?;

        let acc = Arc::new(Mutex::new(Accumulator {
            count: 0,
            last_edge: Instant::now(),
            active: false,
        }));

        let debounce_window = timing.debounce_window;
        let handler_acc = acc.clone();
        gpio.on_edge(
            pin,
            Edge::Falling,
            Box::new(move |_pin, _level| {
                let mut state = handler_acc.lock();
                let now = Instant::now();
                if state.active && now.duration_since(state.last_edge) < debounce_window {
                    // Bounce: too close to the previous edge, discard.
                    return;
                }
                state.count += 1;
                state.last_edge = now;
                state.active = true;
            }),
        )?;

        let poll_acc = acc.clone();
        let pulse_timeout = timing.pulse_timeout;
        let poll_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let digit = {
                    let mut state = poll_acc.lock();
                    if state.active && state.last_edge.elapsed() > pulse_timeout {
                        let count = state.count;
                        state.count = 0;
                        state.active = false;
                        Some((count % 10) as u8)
                    } else {
                        None
                    }
                };
                if let Some(digit) = digit {
                    if digits.send(digit).await.is_err() {
                        // Receiver gone; nothing left to decode for.
                        break;
                    }
                }
            }
        });

        Ok(Self {
            gpio,
            pin,
            acc,
            poll_task: Some(poll_task),
        })
    }

    /// Stop watching the pin and cancel the quiescence timer.
    pub fn stop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        let _ = self.gpio.remove_handler(self.pin);
    }
}

impl Drop for DialReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotary_gpio::{Level, MockGpio};

    async fn pulse_n(gpio: &MockGpio, pin: Pin, n: u32) {
        for _ in 0..n {
            gpio.pulse(pin, 2_000, 2_000).await.unwrap();
        }
    }

    #[tokio::test]
    async fn five_pulses_emit_digit_five() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _reader = DialReader::start(
            gpio.clone(),
            4,
            DialTiming {
                pulse_timeout: Duration::from_millis(50),
                debounce_window: Duration::from_micros(500),
            },
            tx,
        )
        .unwrap();

        pulse_n(&gpio, 4, 5).await;

        let digit = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out waiting for digit")
            .expect("channel closed");
        assert_eq!(digit, 5);
    }

    #[tokio::test]
    async fn ten_pulses_emit_zero() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _reader = DialReader::start(
            gpio.clone(),
            4,
            DialTiming {
                pulse_timeout: Duration::from_millis(50),
                debounce_window: Duration::from_micros(500),
            },
            tx,
        )
        .unwrap();

        pulse_n(&gpio, 4, 10).await;

        let digit = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out waiting for digit")
            .expect("channel closed");
        assert_eq!(digit, 0);
    }

    #[tokio::test]
    async fn bounce_within_debounce_window_is_not_double_counted() {
        let gpio = Arc::new(MockGpio::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _reader = DialReader::start(
            gpio.clone(),
            4,
            DialTiming {
                pulse_timeout: Duration::from_millis(50),
                debounce_window: Duration::from_millis(20),
            },
            tx,
        )
        .unwrap();

        // A single pulse, then a rapid bounce well inside the debounce window.
        gpio.set_level(4, Level::Low).unwrap();
        gpio.set_level(4, Level::High).unwrap();
        tokio::time::sleep(Duration::from_micros(500)).await;
        gpio.set_level(4, Level::Low).unwrap();
        gpio.set_level(4, Level::High).unwrap();

        let digit = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out waiting for digit")
            .expect("channel closed");
        assert_eq!(digit, 1);
    }
}
