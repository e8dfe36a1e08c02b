use std::sync::Arc;

use async_trait::async_trait;
use chatrelay_core::error::DeviceError;
use chatrelay_engine::traits::{CaptureConstraints, CaptureStream, CapturedAudio, Microphone};

/// The microphone for this platform, or one that always reports `Unsupported`.
pub fn default_microphone() -> Arc<dyn Microphone> {
    #[cfg(any(windows, target_os = "macos"))]
    {
        Arc::new(cpal_backend::CpalMicrophone)
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Arc::new(UnsupportedMicrophone)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedMicrophone;

#[async_trait]
impl Microphone for UnsupportedMicrophone {
    async fn acquire(
        &self,
        _constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, DeviceError> {
        Err(DeviceError::Unsupported)
    }
}

/// Turns raw PCM into the payload handed to the audio controller.
pub fn pcm_to_captured(samples: &[f32], sample_rate_hz: u32) -> CapturedAudio {
    CapturedAudio {
        chunks: vec![crate::wav::encode_wav_pcm16(samples, sample_rate_hz)],
        mime_type: crate::wav::WAV_MIME.into(),
    }
}

#[cfg(any(windows, target_os = "macos"))]
mod cpal_backend {
    use super::*;
    use crate::recorder::AudioRecorder;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct CpalMicrophone;

    #[async_trait]
    impl Microphone for CpalMicrophone {
        async fn acquire(
            &self,
            constraints: CaptureConstraints,
        ) -> Result<Box<dyn CaptureStream>, DeviceError> {
            // cpal has no processing hints; the OS input chain applies its own.
            log::debug!("capture constraints: {constraints:?}");

            let recorder = tokio::task::spawn_blocking(AudioRecorder::start_default)
                .await
                .map_err(|e| DeviceError::Other(e.to_string()))??;
            Ok(Box::new(CpalStream {
                recorder: Some(recorder),
            }))
        }
    }

    struct CpalStream {
        recorder: Option<AudioRecorder>,
    }

    #[async_trait]
    impl CaptureStream for CpalStream {
        async fn finish(&mut self) -> Result<CapturedAudio, DeviceError> {
            let recorder = self
                .recorder
                .take()
                .ok_or_else(|| DeviceError::Other("recording already finished".into()))?;

            let pcm = tokio::task::spawn_blocking(move || recorder.stop())
                .await
                .map_err(|e| DeviceError::Other(e.to_string()))?;
            Ok(pcm_to_captured(&pcm.samples, pcm.sample_rate_hz))
        }

        fn release(&mut self) {
            // Dropping the recorder stops the stream and joins its thread.
            self.recorder.take();
        }
    }
}
