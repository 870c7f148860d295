use std::sync::Arc;
use std::time::Duration;

use rotary_gpio::{GpioPort, Level, Pin};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::sink::AudioSink;

pub const DEFAULT_RING_ON: Duration = Duration::from_secs(2);
pub const DEFAULT_RING_OFF: Duration = Duration::from_secs(4);

/// Drives the ringer amplifier-enable output and a process-wide audio sink
/// through the cadenced ring/pause loop described in the core design:
/// raise enable, play (looping within the ring-on window), lower enable,
/// pause, repeat. `stop()` is instantaneous, idempotent, and always leaves
/// the enable output low.
pub struct Ringer {
    gpio: Arc<dyn GpioPort>,
    enable_pin: Pin,
    audio: Arc<dyn AudioSink>,
    ring_file: String,
    ring_on: Duration,
    ring_off: Duration,
    ringing_tx: watch::Sender<bool>,
    ringing_rx: watch::Receiver<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Ringer {
    pub fn new(
        gpio: Arc<dyn GpioPort>,
        enable_pin: Pin,
        audio: Arc<dyn AudioSink>,
        ring_file: impl Into<String>,
        ring_on: Duration,
        ring_off: Duration,
    ) -> Result<Self, rotary_gpio::GpioError> {
        gpio.configure_output(enable_pin)?;
        gpio.write(enable_pin, Level::Low)?;
        let (ringing_tx, ringing_rx) = watch::channel(false);
        Ok(Self {
            gpio,
            enable_pin,
            audio,
            ring_file: ring_file.into(),
            ring_on,
            ring_off,
            ringing_tx,
            ringing_rx,
            task: std::sync::Mutex::new(None),
        })
    }

    pub fn is_ringing(&self) -> bool {
        *self.ringing_rx.borrow()
    }

    /// Start (or, if already ringing, no-op) the cadenced ring loop.
    pub fn ring(&self) {
        if self.is_ringing() {
            return;
        }
        let _ = self.ringing_tx.send(true);

        let gpio = self.gpio.clone();
        let enable_pin = self.enable_pin;
        let audio = self.audio.clone();
        let ring_file = self.ring_file.clone();
        let ring_on = self.ring_on;
        let ring_off = self.ring_off;
        let mut ringing_rx = self.ringing_rx.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !*ringing_rx.borrow() {
                    break;
                }
                let _ = gpio.write(enable_pin, Level::High);

                tokio::select! {
                    _ = play_within_window(audio.as_ref(), &ring_file, ring_on) => {}
                    _ = ringing_rx.changed() => {
                        if !*ringing_rx.borrow() {
                            let _ = gpio.write(enable_pin, Level::Low);
                            break;
                        }
                    }
                }

                let _ = gpio.write(enable_pin, Level::Low);
                if !*ringing_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(ring_off) => {}
                    _ = ringing_rx.changed() => {
                        if !*ringing_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("ringer loop exited");
        });

        *self.task.lock().unwrap() = Some(handle);
    }

    /// Stop ringing unconditionally: cancels in-flight playback and forces
    /// the enable output low, regardless of which phase of the cadence the
    /// loop was in.
    pub fn stop(&self) {
        let _ = self.ringing_tx.send(false);
        let _ = self.gpio.write(self.enable_pin, Level::Low);
    }
}

impl Drop for Ringer {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Play `path` repeatedly until `window` elapses (the "looping within the
/// window" requirement for waveforms shorter than the ring-on duration).
async fn play_within_window(audio: &dyn AudioSink, path: &str, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::select! {
            _ = audio.play(path) => {}
            _ = tokio::time::sleep_until(deadline) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_sink::MockAudioSink;
    use rotary_gpio::MockGpio;

    #[tokio::test]
    async fn ring_raises_enable_and_stop_forces_it_low() {
        let gpio = Arc::new(MockGpio::new());
        let audio = Arc::new(MockAudioSink::new(Duration::from_millis(5)));
        let ringer = Ringer::new(
            gpio.clone(),
            27,
            audio,
            "ring.wav",
            Duration::from_millis(60),
            Duration::from_millis(60),
        )
        .unwrap();

        assert_eq!(gpio.read(27).unwrap(), Level::Low);
        ringer.ring();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ringer.is_ringing());
        assert_eq!(gpio.read(27).unwrap(), Level::High);

        ringer.stop();
        // stop() is synchronous about forcing the pin low.
        assert_eq!(gpio.read(27).unwrap(), Level::Low);
        assert!(!ringer.is_ringing());
    }

    #[tokio::test]
    async fn waveform_shorter_than_window_loops() {
        let gpio = Arc::new(MockGpio::new());
        let audio = Arc::new(MockAudioSink::new(Duration::from_millis(5)));
        let ringer = Ringer::new(
            gpio.clone(),
            27,
            audio.clone(),
            "ring.wav",
            Duration::from_millis(50),
            Duration::from_millis(500),
        )
        .unwrap();

        ringer.ring();
        tokio::time::sleep(Duration::from_millis(60)).await;
        ringer.stop();

        assert!(audio.played().len() >= 2, "expected looped playback within the ring-on window");
    }
}
