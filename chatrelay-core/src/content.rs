use crate::types::{MediaKind, TYPING_SENTINEL};
use regex::Regex;
use std::sync::OnceLock;

/// Content must be strictly longer than this to be considered encoded binary.
pub const MIN_ENCODED_LEN: usize = 100;

/// Share of characters that must come from the base64 alphabet.
pub const MIN_ALPHABET_RATIO: f64 = 0.95;

fn url_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"://|http|www\.").expect("valid url shape regex"))
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Heuristic guess whether `s` is binary-as-text rather than prose.
///
/// Anything URL-shaped or already a data URI is never treated as a payload.
pub fn is_likely_base64(s: &str) -> bool {
    let len = s.chars().count();
    if len <= MIN_ENCODED_LEN {
        return false;
    }
    if s.starts_with("data:") || url_shape_re().is_match(s) {
        return false;
    }

    let valid = s.chars().filter(|c| is_base64_char(*c)).count();
    valid as f64 / len as f64 > MIN_ALPHABET_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Audio,
    Image,
    Typing,
    Text,
}

/// The single seam between raw content and rendering decisions.
pub fn classify_content(content: &str, media_kind: MediaKind) -> ContentClass {
    let encoded = is_likely_base64(content);

    if encoded && media_kind == MediaKind::Audio {
        ContentClass::Audio
    } else if content == TYPING_SENTINEL {
        ContentClass::Typing
    } else if encoded && media_kind == MediaKind::Image {
        ContentClass::Image
    } else {
        ContentClass::Text
    }
}
