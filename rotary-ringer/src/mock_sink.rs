use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::sink::{AudioResult, AudioSink};

/// Records every path played, for assertions in call-manager and ringer
/// tests. Each call "plays" for a short, fixed duration so cadence tests
/// don't have to wait out real waveform lengths.
pub struct MockAudioSink {
    played: Arc<Mutex<Vec<String>>>,
    play_duration: Duration,
}

impl MockAudioSink {
    pub fn new(play_duration: Duration) -> Self {
        Self {
            played: Arc::new(Mutex::new(Vec::new())),
            play_duration,
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }
}

impl Default for MockAudioSink {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

#[async_trait]
impl AudioSink for MockAudioSink {
    async fn play(&self, path: &str) -> AudioResult<()> {
        self.played.lock().push(path.to_string());
        tokio::time::sleep(self.play_duration).await;
        Ok(())
    }
}
