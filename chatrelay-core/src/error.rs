use thiserror::Error;

use crate::types::MessageKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file is {size} bytes; the limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("recording is {size} bytes; the limit is {max} bytes")]
    AudioTooLarge { size: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no microphone found")]
    NotFound,

    #[error("microphone is busy")]
    Busy,

    #[error("audio capture is not supported")]
    Unsupported,

    #[error("recording failed: {0}")]
    Other(String),
}

/// Every failure a chat operation can hit.
///
/// Errors never propagate past the component that produced them: they are
/// turned into one chat line via [`ChatError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The host reports no network before anything was attempted.
    #[error("offline")]
    Offline,

    #[error("network unreachable: {0}")]
    Connectivity(String),

    #[error("request timed out")]
    Timeout,

    /// Non-2xx status (`status` set) or an unusable response body.
    #[error("transport failure (status {status:?}): {detail}")]
    Transport { status: Option<u16>, detail: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("decode failed: {0}")]
    Decode(String),
}

impl ChatError {
    pub fn status(status: u16) -> Self {
        ChatError::Transport {
            status: Some(status),
            detail: format!("HTTP {status}"),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        ChatError::Transport {
            status: None,
            detail: detail.into(),
        }
    }

    /// The chat line shown for this failure while handling a `kind` message.
    pub fn user_message(&self, kind: MessageKind) -> String {
        match self {
            ChatError::Offline => match kind {
                MessageKind::Text => {
                    "You are offline. Please check your internet connection.".into()
                }
                MessageKind::Image => "You are offline. Connect to send files.".into(),
                MessageKind::Audio => "You are offline. Connect to send audio.".into(),
            },
            ChatError::Validation(v) => match v {
                ValidationError::FileTooLarge { .. } => {
                    "File too large. The maximum size is 10MB.".into()
                }
                ValidationError::UnsupportedFileType(_) => {
                    "Unsupported file type. Use: JPG, PNG, GIF or WebP.".into()
                }
                ValidationError::AudioTooLarge { .. } => {
                    "Audio too long. Record shorter messages.".into()
                }
            },
            ChatError::Device(d) => match d {
                DeviceError::PermissionDenied => {
                    "Microphone permission was denied. Check your system settings.".into()
                }
                DeviceError::NotFound => "No microphone found on this device.".into(),
                DeviceError::Busy => {
                    "The microphone is being used by another application.".into()
                }
                DeviceError::Unsupported => {
                    "Audio recording is not supported on this device.".into()
                }
                DeviceError::Other(_) => "Error during recording. Try again.".into(),
            },
            ChatError::Decode(_) => match kind {
                MessageKind::Audio => "Error processing audio recording.".into(),
                _ => "Error reading file.".into(),
            },
            ChatError::Connectivity(_) | ChatError::Timeout | ChatError::Transport { .. } => {
                match kind {
                    MessageKind::Image => "Error processing file on the server.".into(),
                    MessageKind::Audio => "Error processing audio. Try again.".into(),
                    MessageKind::Text => match self {
                        ChatError::Connectivity(_) => {
                            "Connection error. Check your internet.".into()
                        }
                        ChatError::Timeout => "Response timed out. Try again.".into(),
                        _ => "Failed to send message.".into(),
                    },
                }
            }
        }
    }
}
