use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CHAT_TITLE: &str = "Chat";

fn default_true() -> bool {
    true
}

/// Immutable widget configuration, threaded into each component at startup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    #[serde(default = "default_true")]
    pub is_use_supabase: bool,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_key: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub chat_title: Option<String>,
    #[serde(default = "default_true")]
    pub enable_audio_recording: bool,
    #[serde(default = "default_true")]
    pub enable_file_upload: bool,
}

impl std::fmt::Debug for WidgetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetConfig")
            .field("is_use_supabase", &self.is_use_supabase)
            .field("supabase_url", &self.supabase_url)
            .field(
                "supabase_key",
                &self.supabase_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("webhook_url", &self.webhook_url)
            .field("table_name", &self.table_name)
            .field("chat_title", &self.chat_title)
            .field("enable_audio_recording", &self.enable_audio_recording)
            .field("enable_file_upload", &self.enable_file_upload)
            .finish()
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            is_use_supabase: true,
            supabase_url: None,
            supabase_key: None,
            webhook_url: None,
            table_name: None,
            chat_title: None,
            enable_audio_recording: true,
            enable_file_upload: true,
        }
    }
}

/// Partial configuration as delivered by one host channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub is_use_supabase: Option<bool>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub webhook_url: Option<String>,
    pub table_name: Option<String>,
    pub chat_title: Option<String>,
    pub enable_audio_recording: Option<bool>,
    pub enable_file_upload: Option<bool>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self == &ConfigOverrides::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    SupabaseUrl,
    SupabaseKey,
    TableName,
    WebhookUrl,
}

impl RequiredField {
    pub fn key(self) -> &'static str {
        match self {
            RequiredField::SupabaseUrl => "supabaseUrl",
            RequiredField::SupabaseKey => "supabaseKey",
            RequiredField::TableName => "tableName",
            RequiredField::WebhookUrl => "webhookUrl",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RequiredField::SupabaseUrl => "Supabase URL",
            RequiredField::SupabaseKey => "Supabase key",
            RequiredField::TableName => "Table name",
            RequiredField::WebhookUrl => "Webhook URL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing configuration: {}", labels(.0))]
    MissingFields(Vec<RequiredField>),
}

fn labels(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Realtime backend coordinates; only produced from a validated config.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseSettings {
    pub url: String,
    pub key: String,
    pub table: String,
}

impl std::fmt::Debug for SupabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSettings")
            .field("url", &self.url)
            .field("key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl WidgetConfig {
    /// Apply a host channel on top of this config; set fields win.
    pub fn merged(&self, o: &ConfigOverrides) -> Self {
        Self {
            is_use_supabase: o.is_use_supabase.unwrap_or(self.is_use_supabase),
            supabase_url: o.supabase_url.clone().or_else(|| self.supabase_url.clone()),
            supabase_key: o.supabase_key.clone().or_else(|| self.supabase_key.clone()),
            webhook_url: o.webhook_url.clone().or_else(|| self.webhook_url.clone()),
            table_name: o.table_name.clone().or_else(|| self.table_name.clone()),
            chat_title: o.chat_title.clone().or_else(|| self.chat_title.clone()),
            enable_audio_recording: o
                .enable_audio_recording
                .unwrap_or(self.enable_audio_recording),
            enable_file_upload: o.enable_file_upload.unwrap_or(self.enable_file_upload),
        }
    }

    pub fn missing_fields(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();

        if self.is_use_supabase {
            if present(&self.supabase_url).is_none() {
                missing.push(RequiredField::SupabaseUrl);
            }
            if present(&self.supabase_key).is_none() {
                missing.push(RequiredField::SupabaseKey);
            }
            if present(&self.table_name).is_none() {
                missing.push(RequiredField::TableName);
            }
        }

        // Sending is impossible without a webhook, in either mode.
        if present(&self.webhook_url).is_none() {
            missing.push(RequiredField::WebhookUrl);
        }

        missing
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing))
        }
    }

    pub fn webhook_url(&self) -> Option<&str> {
        present(&self.webhook_url)
    }

    pub fn title(&self) -> &str {
        present(&self.chat_title).unwrap_or(DEFAULT_CHAT_TITLE)
    }

    /// `None` in webhook-only mode or when any backend field is absent.
    pub fn supabase(&self) -> Option<SupabaseSettings> {
        if !self.is_use_supabase {
            return None;
        }
        Some(SupabaseSettings {
            url: present(&self.supabase_url)?.to_string(),
            key: present(&self.supabase_key)?.to_string(),
            table: present(&self.table_name)?.to_string(),
        })
    }
}
