use std::fs::File;
use std::io::BufReader;

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::sink::{AudioError, AudioResult, AudioSink};

/// Real playback sink for the process-wide USB audio output device, built on
/// `rodio`. Compiled only under the `hardware` feature.
pub struct RodioSink {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl RodioSink {
    pub fn new() -> AudioResult<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, path: &str) -> AudioResult<()> {
        let path = path.to_string();
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || -> AudioResult<()> {
            let file = File::open(&path).map_err(|e| AudioError::DecodeFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let source = Decoder::new(BufReader::new(file)).map_err(|e| AudioError::DecodeFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let sink = Sink::try_new(&handle)
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        })
        .await
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
    }
}
