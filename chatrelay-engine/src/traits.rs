use async_trait::async_trait;
use chatrelay_core::error::DeviceError;
use chatrelay_providers::request::HttpRequest;
use chatrelay_providers::runtime::{HttpError, HttpResponse};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Host connectivity probe consulted before any send is attempted.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Processing hints passed to the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedAudio {
    pub chunks: Vec<Vec<u8>>,
    pub mime_type: String,
}

impl CapturedAudio {
    pub fn total_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.chunks.concat()
    }
}

#[async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, DeviceError>;
}

/// A live capture. Implementations must also release their tracks on drop.
#[async_trait]
pub trait CaptureStream: Send {
    /// Stop capturing and hand back everything recorded.
    async fn finish(&mut self) -> Result<CapturedAudio, DeviceError>;

    /// Stop all tracks. Must be idempotent.
    fn release(&mut self);
}

/// A user-selected file, not yet read.
#[async_trait]
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn mime_type(&self) -> &str;
    async fn read(&self) -> anyhow::Result<Vec<u8>>;
}
