use crate::renderer::UnitId;
use chatrelay_core::error::{ChatError, ValidationError};
use serde::{Deserialize, Serialize};

/// What happened to one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing rendered.
    Ignored,

    /// Host reported no network; only the notice was rendered.
    Offline { notice: UnitId },

    Replied { user: UnitId, reply: UnitId },

    Failed {
        user: UnitId,
        error: ChatError,
        error_unit: UnitId,
    },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Replied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStage {
    Idle,
    Validating,
    Reading,
    Dispatching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Uploads are switched off in the config.
    Disabled,

    /// Another selection is still being processed.
    Busy,

    Rejected(ValidationError),

    ReadFailed,

    Sent(SendOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioStage {
    Idle,
    /// Waiting for the device to hand over a stream.
    Starting,
    Recording,
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutcome {
    Disabled,
    Offline,
    Started,

    /// The requested transition does not apply in the current stage.
    Ignored(AudioStage),

    DeviceFailed(ChatError),

    /// Torn down while the device was still being acquired.
    Cancelled,

    Rejected(ValidationError),

    Sent(SendOutcome),
}
