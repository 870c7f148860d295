use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{Edge, EdgeHandler, GpioError, GpioPort, GpioResult, Level, Pin, Pull};

#[derive(Clone, Copy)]
enum Direction {
    Input(Pull),
    Output,
}

struct Registered {
    edge: Edge,
    handler: std::sync::Arc<EdgeHandler>,
}

struct PinState {
    direction: Direction,
    level: Level,
}

struct Inner {
    pins: HashMap<Pin, PinState>,
    handlers: HashMap<Pin, Registered>,
}

/// In-memory [`GpioPort`] used by every other crate's test suite and by
/// `rotaryd` when run without the `hardware` feature.
///
/// Tests drive it with [`MockGpio::set_level`] (an instantaneous level
/// change) or [`MockGpio::pulse`] (an async, timed low-then-high waveform,
/// for simulating a rotary dial pulse or a debounced hook bounce).
pub struct MockGpio {
    inner: Mutex<Inner>,
}

impl Default for MockGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pins: HashMap::new(),
                handlers: HashMap::new(),
            }),
        }
    }

    /// Instantaneously set a pin's level, firing a registered edge handler if
    /// the new level constitutes a watched edge and the level actually
    /// changed.
    pub fn set_level(&self, pin: Pin, level: Level) -> GpioResult<()> {
        let fire = {
            let mut inner = self.inner.lock();
            let state = inner
                .pins
                .get_mut(&pin)
                .ok_or(GpioError::PinUnconfigured(pin))?;
            let previous = state.level;
            state.level = level;
            if previous == level {
                None
            } else {
                inner.handlers.get(&pin).and_then(|r| {
                    let matches = match r.edge {
                        Edge::Both => true,
                        Edge::Rising => level.is_high(),
                        Edge::Falling => !level.is_high(),
                    };
                    matches.then(|| r.handler.clone())
                })
            }
        };
        if let Some(handler) = fire {
            handler(pin, level);
        }
        Ok(())
    }

    /// Drive a low pulse of `low_us` followed by a return to high held for
    /// `high_us`, the way a single rotary dial interruption (or a hook bounce)
    /// looks on the line. Used by tests; requires a Tokio runtime.
    pub async fn pulse(&self, pin: Pin, low_us: u64, high_us: u64) -> GpioResult<()> {
        self.set_level(pin, Level::Low)?;
        tokio::time::sleep(Duration::from_micros(low_us)).await;
        self.set_level(pin, Level::High)?;
        tokio::time::sleep(Duration::from_micros(high_us)).await;
        Ok(())
    }
}

impl GpioPort for MockGpio {
    fn configure_input(&self, pin: Pin, pull: Pull) -> GpioResult<()> {
        let idle = match pull {
            Pull::Up => Level::High,
            Pull::Down => Level::Low,
            Pull::None => Level::High,
        };
        self.inner.lock().pins.insert(
            pin,
            PinState {
                direction: Direction::Input(pull),
                level: idle,
            },
        );
        Ok(())
    }

    fn configure_output(&self, pin: Pin) -> GpioResult<()> {
        self.inner.lock().pins.insert(
            pin,
            PinState {
                direction: Direction::Output,
                level: Level::Low,
            },
        );
        Ok(())
    }

    fn read(&self, pin: Pin) -> GpioResult<Level> {
        self.inner
            .lock()
            .pins
            .get(&pin)
            .map(|s| s.level)
            .ok_or(GpioError::PinUnconfigured(pin))
    }

    fn write(&self, pin: Pin, level: Level) -> GpioResult<()> {
        let mut inner = self.inner.lock();
        let state = inner
            .pins
            .get_mut(&pin)
            .ok_or(GpioError::PinUnconfigured(pin))?;
        if !matches!(state.direction, Direction::Output) {
            return Err(GpioError::DirectionMismatch {
                pin,
                configured: "input",
                required: "output",
            });
        }
        state.level = level;
        Ok(())
    }

    fn on_edge(&self, pin: Pin, edge: Edge, handler: EdgeHandler) -> GpioResult<()> {
        let mut inner = self.inner.lock();
        let state = inner
            .pins
            .get(&pin)
            .ok_or(GpioError::PinUnconfigured(pin))?;
        if !matches!(state.direction, Direction::Input(_)) {
            return Err(GpioError::DirectionMismatch {
                pin,
                configured: "output",
                required: "input",
            });
        }
        inner.handlers.insert(
            pin,
            Registered {
                edge,
                handler: std::sync::Arc::new(handler),
            },
        );
        Ok(())
    }

    fn remove_handler(&self, pin: Pin) -> GpioResult<()> {
        self.inner.lock().handlers.remove(&pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn read_before_configure_is_an_error() {
        let gpio = MockGpio::new();
        assert_eq!(gpio.read(4), Err(GpioError::PinUnconfigured(4)));
    }

    #[test]
    fn write_to_input_is_direction_mismatch() {
        let gpio = MockGpio::new();
        gpio.configure_input(4, Pull::Up).unwrap();
        assert!(matches!(
            gpio.write(4, Level::High),
            Err(GpioError::DirectionMismatch { .. })
        ));
    }

    #[test]
    fn falling_edge_fires_only_on_high_to_low() {
        let gpio = MockGpio::new();
        gpio.configure_input(4, Pull::Up).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        gpio.on_edge(4, Edge::Falling, Box::new(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        gpio.set_level(4, Level::Low).unwrap();
        gpio.set_level(4, Level::Low).unwrap(); // no-op, unchanged
        gpio.set_level(4, Level::High).unwrap(); // rising, not watched
        gpio.set_level(4, Level::Low).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pulse_drives_low_then_high() {
        let gpio = Arc::new(MockGpio::new());
        gpio.configure_input(4, Pull::Up).unwrap();
        assert_eq!(gpio.read(4).unwrap(), Level::High);
        gpio.pulse(4, 100, 100).await.unwrap();
        assert_eq!(gpio.read(4).unwrap(), Level::High);
    }
}
