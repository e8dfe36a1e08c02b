//
// cpal microphone capture (Windows and macOS).
//
// Opening a recorder starts capturing immediately; the stream lives on its own
// thread and is dropped (device released) as soon as `stop` or `Drop` runs.

use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::Duration;

use chatrelay_core::error::DeviceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, Stream};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum AudioCaptureError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("failed to get default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to play stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio worker startup timeout")]
    WorkerTimeout,

    #[error("audio worker exited unexpectedly")]
    WorkerGone,
}

impl From<AudioCaptureError> for DeviceError {
    fn from(e: AudioCaptureError) -> Self {
        use cpal::{BuildStreamError, DefaultStreamConfigError, PlayStreamError};

        match e {
            AudioCaptureError::NoInputDevice
            | AudioCaptureError::DefaultConfig(DefaultStreamConfigError::DeviceNotAvailable)
            | AudioCaptureError::BuildStream(BuildStreamError::DeviceNotAvailable) => {
                DeviceError::NotFound
            }
            AudioCaptureError::DefaultConfig(DefaultStreamConfigError::StreamTypeNotSupported)
            | AudioCaptureError::BuildStream(BuildStreamError::StreamConfigNotSupported) => {
                DeviceError::Unsupported
            }
            // Another process holding the device exclusively shows up here.
            AudioCaptureError::PlayStream(PlayStreamError::DeviceNotAvailable)
            | AudioCaptureError::WorkerTimeout => DeviceError::Busy,
            other => DeviceError::Other(other.to_string()),
        }
    }
}

/// Mono samples captured so far.
pub struct CapturedPcm {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

pub struct AudioRecorder {
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<std::thread::JoinHandle<()>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate_hz: u32,
}

impl AudioRecorder {
    /// Open the default input device and start recording.
    pub fn start_default() -> Result<Self, AudioCaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioCaptureError::NoInputDevice)?;
        if let Ok(name) = device.name() {
            log::info!("recording from input device: {name}");
        }

        let supported = device.default_input_config()?;
        let sample_rate_hz = supported.sample_rate().0;

        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioCaptureError>>();

        let worker_buffer = buffer.clone();
        let worker = std::thread::spawn(move || {
            let channels = supported.channels() as usize;
            let config: cpal::StreamConfig = supported.config();

            let stream = match supported.sample_format() {
                SampleFormat::I16 => build::<i16>(&device, &config, channels, worker_buffer),
                SampleFormat::U16 => build::<u16>(&device, &config, channels, worker_buffer),
                SampleFormat::I32 => build::<i32>(&device, &config, channels, worker_buffer),
                SampleFormat::F64 => build::<f64>(&device, &config, channels, worker_buffer),
                _ => build::<f32>(&device, &config, channels, worker_buffer),
            };

            let stream = match stream.map_err(AudioCaptureError::from).and_then(|s| {
                s.play()?;
                Ok(s)
            }) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("audio stream failed to start: {e}");
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let _ = ready_tx.send(Ok(()));

            // Either an explicit stop or the recorder being dropped ends capture.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = stop_tx.send(());
                return Err(AudioCaptureError::WorkerTimeout);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                return Err(AudioCaptureError::WorkerGone);
            }
        }

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            buffer,
            sample_rate_hz,
        })
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }

    /// Release the device and return everything recorded.
    pub fn stop(mut self) -> CapturedPcm {
        self.shutdown();
        let samples = std::mem::take(
            &mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner),
        );
        CapturedPcm {
            sample_rate_hz: self.sample_rate_hz,
            samples,
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    buffer: Arc<Mutex<Vec<f32>>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let on_data = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend(data.chunks_exact(channels).map(|frame| {
            frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
        }));
    };

    device.build_input_stream(
        config,
        on_data,
        |err| log::error!("audio stream error: {err}"),
        None,
    )
}
