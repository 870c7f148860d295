//! Ringer output driver: cadenced amplifier-enable toggling gated audio
//! playback, for the rotary phone core.

mod mock_sink;
mod ringer;
mod sink;

#[cfg(feature = "hardware")]
mod rodio_sink;

pub use mock_sink::MockAudioSink;
pub use ringer::{Ringer, DEFAULT_RING_OFF, DEFAULT_RING_ON};
pub use sink::{AudioError, AudioResult, AudioSink};

#[cfg(feature = "hardware")]
pub use rodio_sink::RodioSink;
