use std::collections::HashMap;

use parking_lot::Mutex;
use rppal::gpio::{Gpio, InputPin, Level as RppalLevel, OutputPin, Trigger};

use crate::{Edge, EdgeHandler, GpioError, GpioPort, GpioResult, Level, Pin, Pull};

enum Line {
    Input(InputPin),
    Output(OutputPin),
}

/// Real GPIO backend for the Raspberry Pi family of single-board computers,
/// built on `rppal`. Compiled only under the `hardware` feature; every other
/// crate in the workspace develops and tests against [`crate::MockGpio`]
/// instead.
pub struct HardwareGpio {
    chip: Gpio,
    lines: Mutex<HashMap<Pin, Line>>,
}

impl HardwareGpio {
    pub fn new() -> GpioResult<Self> {
        let chip = Gpio::new().map_err(|e| GpioError::HardwareUnavailable(e.to_string()))?;
        Ok(Self {
            chip,
            lines: Mutex::new(HashMap::new()),
        })
    }
}

fn to_rppal_level(level: Level) -> RppalLevel {
    match level {
        Level::High => RppalLevel::High,
        Level::Low => RppalLevel::Low,
    }
}

fn from_rppal_level(level: RppalLevel) -> Level {
    match level {
        RppalLevel::High => Level::High,
        RppalLevel::Low => Level::Low,
    }
}

fn to_rppal_trigger(edge: Edge) -> Trigger {
    match edge {
        Edge::Rising => Trigger::RisingEdge,
        Edge::Falling => Trigger::FallingEdge,
        Edge::Both => Trigger::Both,
    }
}

impl GpioPort for HardwareGpio {
    fn configure_input(&self, pin: Pin, pull: Pull) -> GpioResult<()> {
        let raw = self
            .chip
            .get(pin)
            .map_err(|e| GpioError::HardwareUnavailable(e.to_string()))?;
        let input = match pull {
            Pull::Up => raw.into_input_pullup(),
            Pull::Down => raw.into_input_pulldown(),
            Pull::None => raw.into_input(),
        };
        self.lines.lock().insert(pin, Line::Input(input));
        Ok(())
    }

    fn configure_output(&self, pin: Pin) -> GpioResult<()> {
        let raw = self
            .chip
            .get(pin)
            .map_err(|e| GpioError::HardwareUnavailable(e.to_string()))?;
        self.lines.lock().insert(pin, Line::Output(raw.into_output()));
        Ok(())
    }

    fn read(&self, pin: Pin) -> GpioResult<Level> {
        let mut lines = self.lines.lock();
        match lines.get_mut(&pin) {
            Some(Line::Input(p)) => Ok(from_rppal_level(p.read())),
            Some(Line::Output(p)) => Ok(Level::from(p.is_set_high())),
            None => Err(GpioError::PinUnconfigured(pin)),
        }
    }

    fn write(&self, pin: Pin, level: Level) -> GpioResult<()> {
        let mut lines = self.lines.lock();
        match lines.get_mut(&pin) {
            Some(Line::Output(p)) => {
                match to_rppal_level(level) {
                    RppalLevel::High => p.set_high(),
                    RppalLevel::Low => p.set_low(),
                }
                Ok(())
            }
            Some(Line::Input(_)) => Err(GpioError::DirectionMismatch {
                pin,
                configured: "input",
                required: "output",
            }),
            None => Err(GpioError::PinUnconfigured(pin)),
        }
    }

    fn on_edge(&self, pin: Pin, edge: Edge, handler: EdgeHandler) -> GpioResult<()> {
        let mut lines = self.lines.lock();
        match lines.get_mut(&pin) {
            Some(Line::Input(p)) => p
                .set_async_interrupt(to_rppal_trigger(edge), move |level| {
                    handler(pin, from_rppal_level(level));
                })
                .map_err(|e| GpioError::HardwareUnavailable(e.to_string())),
            Some(Line::Output(_)) => Err(GpioError::DirectionMismatch {
                pin,
                configured: "output",
                required: "input",
            }),
            None => Err(GpioError::PinUnconfigured(pin)),
        }
    }

    fn remove_handler(&self, pin: Pin) -> GpioResult<()> {
        let mut lines = self.lines.lock();
        match lines.get_mut(&pin) {
            Some(Line::Input(p)) => {
                p.clear_async_interrupt()
                    .map_err(|e| GpioError::HardwareUnavailable(e.to_string()))?;
                Ok(())
            }
            Some(Line::Output(_)) => Err(GpioError::DirectionMismatch {
                pin,
                configured: "output",
                required: "input",
            }),
            None => Err(GpioError::PinUnconfigured(pin)),
        }
    }
}
