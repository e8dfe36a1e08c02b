use crate::request::{Body, HttpRequest};
use anyhow::Context;
use chatrelay_core::config::SupabaseSettings;
use chatrelay_core::types::{MediaKind, MessageRecord, Role, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowMessage {
    #[serde(default)]
    pub role: Option<String>,
    /// Memory rows carry `type` ("human"/"ai"), sometimes next to `role`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "messageType")]
    pub media_type: Option<String>,
}

/// One row of the chat table, as returned by REST and by the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatRow {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<RowMessage>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatRow {
    /// `role` wins over `type`; a row with neither is a reply.
    pub fn role(&self) -> Role {
        self.message
            .as_ref()
            .and_then(|m| m.role.as_deref().or(m.kind.as_deref()))
            .map_or(Role::Assistant, Role::from_wire)
    }

    pub fn belongs_to(&self, session: &SessionId) -> bool {
        self.session_id
            .as_deref()
            .is_none_or(|id| id == session.as_str())
    }

    /// `None` when the row has no displayable content.
    pub fn to_record(&self) -> Option<MessageRecord> {
        let msg = self.message.as_ref()?;
        let content = msg.content.as_deref().filter(|c| !c.is_empty())?;

        let media_kind = match msg.media_type.as_deref() {
            Some("image") => MediaKind::Image,
            Some("audio") => MediaKind::Audio,
            _ => MediaKind::None,
        };

        let created_at = self
            .created_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(
            MessageRecord::new(self.role(), content)
                .with_media(media_kind)
                .at(created_at),
        )
    }
}

/// All rows for `session`, oldest first.
pub fn build_history_request(
    settings: &SupabaseSettings,
    session: &SessionId,
) -> anyhow::Result<HttpRequest> {
    let base = settings.url.trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/rest/v1/{}", settings.table))
        .with_context(|| format!("invalid Supabase URL: {base}"))?;
    url.query_pairs_mut()
        .append_pair("select", "*")
        .append_pair("session_id", &format!("eq.{}", session.as_str()))
        .append_pair("order", "created_at.asc");

    Ok(HttpRequest {
        method: "GET".into(),
        url: url.to_string(),
        headers: vec![
            ("apikey".into(), settings.key.clone()),
            ("Authorization".into(), format!("Bearer {}", settings.key)),
            ("Accept".into(), "application/json".into()),
        ],
        body: Body::Empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SupabaseSettings {
        SupabaseSettings {
            url: "https://proj.supabase.co/".into(),
            key: "anon".into(),
            table: "chat_messages".into(),
        }
    }

    #[test]
    fn history_request_filters_and_orders() {
        let req = build_history_request(&settings(), &SessionId::new("123_abc")).unwrap();
        let url = Url::parse(&req.url).unwrap();
        assert_eq!(url.path(), "/rest/v1/chat_messages");

        let qp: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(qp.get("session_id").map(|s| s.as_str()), Some("eq.123_abc"));
        assert_eq!(qp.get("order").map(|s| s.as_str()), Some("created_at.asc"));
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("authorization"), Some("Bearer anon"));
    }

    #[test]
    fn row_converts_to_record() {
        let row: ChatRow = serde_json::from_str(
            r#"{"message":{"role":"assistant","content":"hello"},"created_at":"2024-05-01T10:00:00.123+00:00"}"#,
        )
        .unwrap();
        let rec = row.to_record().unwrap();
        assert_eq!(rec.role, Role::Assistant);
        assert_eq!(rec.content, "hello");
        assert_eq!(rec.created_at.to_rfc3339(), "2024-05-01T10:00:00.123+00:00");
    }

    #[test]
    fn legacy_type_field_and_media_type_are_understood() {
        let row: ChatRow = serde_json::from_str(
            r#"{"message":{"type":"user","content":"QUJD","messageType":"audio"}}"#,
        )
        .unwrap();
        let rec = row.to_record().unwrap();
        assert_eq!(rec.role, Role::User);
        assert_eq!(rec.media_kind, MediaKind::Audio);
    }

    #[test]
    fn memory_rows_use_human_and_ai() {
        let human: ChatRow = serde_json::from_str(
            r#"{"session_id":"s","message":{"type":"human","content":"my question"}}"#,
        )
        .unwrap();
        assert_eq!(human.role(), Role::User);

        let ai: ChatRow =
            serde_json::from_str(r#"{"session_id":"s","message":{"type":"ai","content":"answer"}}"#)
                .unwrap();
        assert_eq!(ai.to_record().unwrap().role, Role::Assistant);
    }

    #[test]
    fn role_and_type_together_prefer_role() {
        let row: ChatRow = serde_json::from_str(
            r#"{"message":{"role":"assistant","type":"human","content":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(row.role(), Role::Assistant);
        assert_eq!(ChatRow::default().role(), Role::Assistant);
    }

    #[test]
    fn empty_rows_are_skipped() {
        assert!(ChatRow::default().to_record().is_none());
        let row: ChatRow =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":""}}"#).unwrap();
        assert!(row.to_record().is_none());
    }

    #[test]
    fn rows_without_session_are_accepted() {
        let s = SessionId::new("a");
        assert!(ChatRow::default().belongs_to(&s));
        let other = ChatRow {
            session_id: Some("b".into()),
            ..Default::default()
        };
        assert!(!other.belongs_to(&s));
    }
}
