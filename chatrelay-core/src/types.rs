use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Content of the transient "typing" unit shown while a reply is pending.
pub const TYPING_SENTINEL: &str = "Typing...";

const SESSION_SUFFIX_LEN: usize = 13;
const SESSION_SHORT_LEN: usize = 12;

/// Per-page-load identifier scoping history and realtime filtering.
///
/// Never persisted: a new one is generated every time a chat is started.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// `<unix millis>_<13 lowercase alphanumerics>`.
    pub fn generate() -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SESSION_SUFFIX_LEN)
            .collect();
        Self(format!("{ts}_{suffix}"))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing characters shown in the session badge.
    pub fn short(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(SESSION_SHORT_LEN - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Rows written by the backend use free-form role strings. Chat rows say
    /// "user"/"assistant", agent memory rows say "human"/"ai"; anything else is
    /// treated as a reply.
    pub fn from_wire(value: &str) -> Self {
        let v = value.trim();
        if v.eq_ignore_ascii_case("user") || v.eq_ignore_ascii_case("human") {
            Role::User
        } else {
            Role::Assistant
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    None,
    Image,
    Audio,
}

/// The `messageType` of an outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        }
    }

    pub fn media_kind(self) -> MediaKind {
        match self {
            MessageKind::Text => MediaKind::None,
            MessageKind::Image => MediaKind::Image,
            MessageKind::Audio => MediaKind::Audio,
        }
    }

    /// Shown when the webhook reply carries no `output`.
    pub fn fallback_reply(self) -> &'static str {
        match self {
            MessageKind::Text => "No response",
            MessageKind::Image => "File processed",
            MessageKind::Audio => "Audio processed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media_kind: MediaKind,

    // Only meaningful for images; audio always offers the fixed source list.
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl MessageRecord {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            media_kind: MediaKind::None,
            mime_type: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn typing() -> Self {
        Self::assistant(TYPING_SENTINEL)
    }

    pub fn with_media(mut self, media_kind: MediaKind) -> Self {
        self.media_kind = media_kind;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_typing(&self) -> bool {
        self.content == TYPING_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_timestamp_and_suffix() {
        let id = SessionId::generate();
        let (ts, suffix) = id.as_str().split_once('_').unwrap();
        assert!(ts.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), 13);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn session_short_is_trailing_twelve() {
        let id = SessionId::new("1700000000000_abcdefghijklm");
        assert_eq!(id.short(), "bcdefghijklm");
        assert_eq!(SessionId::new("abc").short(), "abc");
    }

    #[test]
    fn role_from_wire_maps_both_vocabularies() {
        assert_eq!(Role::from_wire("user"), Role::User);
        assert_eq!(Role::from_wire(" USER "), Role::User);
        assert_eq!(Role::from_wire("human"), Role::User);
        assert_eq!(Role::from_wire("Human"), Role::User);
        assert_eq!(Role::from_wire("ai"), Role::Assistant);
        assert_eq!(Role::from_wire("assistant"), Role::Assistant);
    }

    #[test]
    fn message_kind_wire_names() {
        assert_eq!(MessageKind::Text.as_str(), "text");
        assert_eq!(
            serde_json::to_string(&MessageKind::Audio).unwrap(),
            "\"audio\""
        );
        assert_eq!(MessageKind::Image.media_kind(), MediaKind::Image);
    }
}
