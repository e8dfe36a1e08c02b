use base64::Engine;

use crate::error::ChatError;

/// Encode captured media bytes into the transferable text form used on the wire.
pub fn encode_media(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_media(payload: &str) -> Result<Vec<u8>, ChatError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ChatError::Decode(e.to_string()))
}

/// Binary URI for an encoded payload, e.g. `data:audio/webm;base64,...`.
pub fn data_uri(mime_type: &str, payload: &str) -> String {
    format!("data:{mime_type};base64,{payload}")
}
