//! Host initialisation channels: URL query string, cross-document message,
//! direct call. Each one yields a partial config; later channels win field by field.

use chatrelay_core::config::{ConfigError, ConfigOverrides, WidgetConfig};
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum HostInit {
    Query(String),
    Message(Value),
    Direct(ConfigOverrides),
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Parse `?supabaseUrl=...&webhookUrl=...`. Unknown keys and empty values are ignored.
pub fn from_query(query: &str) -> ConfigOverrides {
    let query = query.trim_start_matches('?');
    let mut o = ConfigOverrides::default();

    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        match k.as_ref() {
            "supabaseUrl" => o.supabase_url = non_empty(&v),
            "supabaseKey" => o.supabase_key = non_empty(&v),
            "webhookUrl" => o.webhook_url = non_empty(&v),
            "tableName" => o.table_name = non_empty(&v),
            "chatTitle" => o.chat_title = non_empty(&v),
            "isUseSupabase" => o.is_use_supabase = parse_bool(&v),
            "enableAudioRecording" => o.enable_audio_recording = parse_bool(&v),
            "enableFileUpload" => o.enable_file_upload = parse_bool(&v),
            _ => {}
        }
    }

    o
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn bool_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => n.as_i64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        _ => None,
    }
}

/// Read a message-event payload. Anything that is not a JSON object is ignored.
///
/// Fields with the wrong type are skipped rather than failing the whole message.
pub fn from_message(data: &Value) -> Option<ConfigOverrides> {
    let obj = data.as_object()?;
    Some(ConfigOverrides {
        is_use_supabase: bool_field(obj, "isUseSupabase"),
        supabase_url: string_field(obj, "supabaseUrl"),
        supabase_key: string_field(obj, "supabaseKey"),
        webhook_url: string_field(obj, "webhookUrl"),
        table_name: string_field(obj, "tableName"),
        chat_title: string_field(obj, "chatTitle"),
        enable_audio_recording: bool_field(obj, "enableAudioRecording"),
        enable_file_upload: bool_field(obj, "enableFileUpload"),
    })
}

impl HostInit {
    pub fn overrides(&self) -> Option<ConfigOverrides> {
        match self {
            HostInit::Query(q) => Some(from_query(q)),
            HostInit::Message(v) => from_message(v),
            HostInit::Direct(o) => Some(o.clone()),
        }
    }
}

/// Fold every channel onto `base` in order and validate the result once.
pub fn resolve<'a>(
    base: &WidgetConfig,
    channels: impl IntoIterator<Item = &'a HostInit>,
) -> Result<WidgetConfig, ConfigError> {
    let cfg = channels
        .into_iter()
        .filter_map(HostInit::overrides)
        .filter(|o| !o.is_empty())
        .fold(base.clone(), |cfg, o| cfg.merged(&o));

    cfg.validate()?;
    Ok(cfg)
}
