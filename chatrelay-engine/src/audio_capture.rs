use crate::engine::ChatEngine;
use crate::session::{AudioOutcome, AudioStage};
use crate::traits::{CaptureConstraints, CaptureStream, Microphone};
use chatrelay_core::codec::encode_media;
use chatrelay_core::error::{ChatError, ValidationError};
use chatrelay_core::types::MessageKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const MAX_AUDIO_BYTES: u64 = 5 * 1024 * 1024;

enum AudioState {
    Idle,
    Starting,
    Recording(Box<dyn CaptureStream>),
    Finalizing,
}

impl AudioState {
    fn stage(&self) -> AudioStage {
        match self {
            AudioState::Idle => AudioStage::Idle,
            AudioState::Starting => AudioStage::Starting,
            AudioState::Recording(_) => AudioStage::Recording,
            AudioState::Finalizing => AudioStage::Finalizing,
        }
    }
}

/// idle -> recording -> finalizing -> idle
///
/// Every acquired stream is released on stop, on error and on teardown.
pub struct AudioController {
    engine: Arc<ChatEngine>,
    microphone: Arc<dyn Microphone>,
    enabled: bool,
    constraints: CaptureConstraints,
    state: Mutex<AudioState>,
}

struct FinalizeReset<'a>(&'a AudioController);

impl Drop for FinalizeReset<'_> {
    fn drop(&mut self) {
        let mut st = self.0.lock();
        if matches!(*st, AudioState::Finalizing) {
            *st = AudioState::Idle;
        }
    }
}

impl AudioController {
    pub fn new(engine: Arc<ChatEngine>, microphone: Arc<dyn Microphone>, enabled: bool) -> Self {
        Self {
            engine,
            microphone,
            enabled,
            constraints: CaptureConstraints::default(),
            state: Mutex::new(AudioState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self) -> AudioStage {
        self.lock().stage()
    }

    pub fn is_recording(&self) -> bool {
        self.stage() == AudioStage::Recording
    }

    pub async fn toggle(&self) -> AudioOutcome {
        match self.stage() {
            AudioStage::Recording => self.stop().await,
            _ => self.start().await,
        }
    }

    pub async fn start(&self) -> AudioOutcome {
        if !self.enabled {
            log::warn!("audio recording is disabled");
            return AudioOutcome::Disabled;
        }

        {
            let mut st = self.lock();
            if !matches!(*st, AudioState::Idle) {
                return AudioOutcome::Ignored(st.stage());
            }
            if !self.engine.is_online() {
                drop(st);
                self.engine
                    .render_error(&ChatError::Offline, MessageKind::Audio);
                return AudioOutcome::Offline;
            }
            *st = AudioState::Starting;
        }

        let acquired = self.microphone.acquire(self.constraints).await;

        let mut st = self.lock();
        match acquired {
            Ok(mut stream) => {
                if matches!(*st, AudioState::Starting) {
                    *st = AudioState::Recording(stream);
                    log::info!("recording started");
                    AudioOutcome::Started
                } else {
                    stream.release();
                    log::info!("recording cancelled before it started");
                    AudioOutcome::Cancelled
                }
            }
            Err(e) => {
                if matches!(*st, AudioState::Starting) {
                    *st = AudioState::Idle;
                }
                drop(st);
                log::error!("microphone unavailable: {e}");
                let err = ChatError::Device(e);
                self.engine.render_error(&err, MessageKind::Audio);
                AudioOutcome::DeviceFailed(err)
            }
        }
    }

    pub async fn stop(&self) -> AudioOutcome {
        let mut stream = {
            let mut st = self.lock();
            match std::mem::replace(&mut *st, AudioState::Finalizing) {
                AudioState::Recording(stream) => stream,
                other => {
                    let stage = other.stage();
                    *st = other;
                    return AudioOutcome::Ignored(stage);
                }
            }
        };
        let _reset = FinalizeReset(self);

        let finished = stream.finish().await;
        stream.release();
        drop(stream);

        let captured = match finished {
            Ok(c) => c,
            Err(e) => {
                log::error!("recording failed: {e}");
                let err = ChatError::Device(e);
                self.engine.render_error(&err, MessageKind::Audio);
                return AudioOutcome::DeviceFailed(err);
            }
        };

        let size = captured.total_len() as u64;
        if size > MAX_AUDIO_BYTES {
            let e = ValidationError::AudioTooLarge {
                size,
                max: MAX_AUDIO_BYTES,
            };
            log::warn!("discarding recording: {e}");
            self.engine
                .render_error(&ChatError::from(e.clone()), MessageKind::Audio);
            return AudioOutcome::Rejected(e);
        }

        let mime_type = captured.mime_type.clone();
        let payload = encode_media(&captured.into_bytes());
        let mime = (!mime_type.is_empty()).then_some(mime_type.as_str());
        let sent = self
            .engine
            .send_media(&payload, MessageKind::Audio, mime, None)
            .await;
        AudioOutcome::Sent(sent)
    }

    /// Stop any capture and throw away what was recorded.
    pub fn teardown(&self) {
        let previous = {
            let mut st = self.lock();
            // A stop in flight owns its stream and releases it itself.
            if matches!(*st, AudioState::Finalizing) {
                return;
            }
            std::mem::replace(&mut *st, AudioState::Idle)
        };

        if let AudioState::Recording(mut stream) = previous {
            stream.release();
            log::info!("recording discarded on teardown");
        }
    }
}

impl Drop for AudioController {
    fn drop(&mut self) {
        self.teardown();
    }
}
