use crate::traits::HttpTransport;
use chatrelay_core::error::ChatError;
use chatrelay_core::types::{MessageKind, SessionId};
use chatrelay_providers::parse::parse_webhook_reply;
use chatrelay_providers::runtime::HttpError;
use chatrelay_providers::webhook::{WebhookEnvelope, build_webhook_request};
use std::sync::Arc;

/// Posts one envelope per message to the webhook. No retries.
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    webhook_url: String,
    session: SessionId,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        webhook_url: impl Into<String>,
        session: SessionId,
    ) -> Self {
        Self {
            transport,
            webhook_url: webhook_url.into(),
            session,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Send `content` and return the reply text, or the per-kind fallback
    /// when the reply carries no output.
    pub async fn dispatch(&self, content: &str, kind: MessageKind) -> Result<String, ChatError> {
        self.dispatch_with_file(content, kind, None).await
    }

    pub async fn dispatch_with_file(
        &self,
        content: &str,
        kind: MessageKind,
        file: Option<serde_json::Value>,
    ) -> Result<String, ChatError> {
        let mut envelope = WebhookEnvelope::new(content, &self.session, kind);
        if let Some(file) = file {
            envelope = envelope.with_file(file);
        }

        let req = build_webhook_request(&self.webhook_url, &envelope)
            .map_err(|e| ChatError::malformed(format!("{e:#}")))?;

        let resp = self.transport.execute(&req).await.map_err(|e| match e {
            HttpError::Unreachable(detail) => ChatError::Connectivity(detail),
            HttpError::Timeout => ChatError::Timeout,
            HttpError::Other(e) => ChatError::malformed(format!("{e:#}")),
        })?;

        if !resp.is_success() {
            return Err(ChatError::status(resp.status));
        }

        let output = parse_webhook_reply(&resp.body)
            .map_err(|e| ChatError::malformed(format!("{e:#}")))?;

        Ok(output.unwrap_or_else(|| kind.fallback_reply().to_string()))
    }
}
