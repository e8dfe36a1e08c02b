use crate::request::{Body, HttpRequest};
use anyhow::Context;
use chatrelay_core::types::{MessageKind, SessionId};
use serde::{Deserialize, Serialize};

pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

/// The JSON body posted to the webhook for every outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub message: String,
    pub session_id: String,
    pub action: String,
    #[serde(rename = "messageType")]
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<serde_json::Value>,
}

impl WebhookEnvelope {
    pub fn new(message: impl Into<String>, session: &SessionId, kind: MessageKind) -> Self {
        Self {
            message: message.into(),
            session_id: session.as_str().to_string(),
            action: SEND_MESSAGE_ACTION.into(),
            message_type: kind,
            file: None,
        }
    }

    pub fn with_file(mut self, file: serde_json::Value) -> Self {
        self.file = Some(file);
        self
    }
}

pub fn build_webhook_request(
    webhook_url: &str,
    envelope: &WebhookEnvelope,
) -> anyhow::Result<HttpRequest> {
    let body = serde_json::to_string(envelope).context("encode webhook envelope")?;

    Ok(HttpRequest {
        method: "POST".into(),
        url: webhook_url.to_string(),
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: Body::Json(body),
    })
}
