use crate::dispatcher::Dispatcher;
use crate::renderer::{Renderer, UnitId};
use crate::session::SendOutcome;
use crate::traits::NetworkStatus;
use chatrelay_core::error::ChatError;
use chatrelay_core::types::{MessageKind, MessageRecord, SessionId};
use std::sync::Arc;

/// Removes the typing placeholder when dropped, whatever path the send took.
struct Placeholder<'a> {
    renderer: &'a Renderer,
    id: UnitId,
}

impl<'a> Placeholder<'a> {
    fn show(renderer: &'a Renderer) -> Self {
        let id = renderer.append(&MessageRecord::typing());
        Self { renderer, id }
    }
}

impl Drop for Placeholder<'_> {
    fn drop(&mut self) {
        self.renderer.remove(self.id);
    }
}

/// Outbound pipeline: optimistic render, placeholder, dispatch, final render.
pub struct ChatEngine {
    renderer: Renderer,
    dispatcher: Dispatcher,
    network: Arc<dyn NetworkStatus>,
}

impl ChatEngine {
    pub fn new(renderer: Renderer, dispatcher: Dispatcher, network: Arc<dyn NetworkStatus>) -> Self {
        Self {
            renderer,
            dispatcher,
            network,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn session(&self) -> &SessionId {
        self.dispatcher.session()
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    pub async fn send_text(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }
        if !self.is_online() {
            let notice = self.render_error(&ChatError::Offline, MessageKind::Text);
            return SendOutcome::Offline { notice };
        }

        let user = self.renderer.append(&MessageRecord::user(text));
        self.deliver(user, text, MessageKind::Text, None).await
    }

    /// Send an already encoded image or audio payload.
    pub async fn send_media(
        &self,
        payload: &str,
        kind: MessageKind,
        mime_type: Option<&str>,
        file: Option<serde_json::Value>,
    ) -> SendOutcome {
        if !self.is_online() {
            let notice = self.render_error(&ChatError::Offline, kind);
            return SendOutcome::Offline { notice };
        }

        let mut record = MessageRecord::user(payload).with_media(kind.media_kind());
        if let Some(mime) = mime_type {
            record = record.with_mime_type(mime);
        }
        let user = self.renderer.append(&record);
        self.deliver(user, payload, kind, file).await
    }

    async fn deliver(
        &self,
        user: UnitId,
        content: &str,
        kind: MessageKind,
        file: Option<serde_json::Value>,
    ) -> SendOutcome {
        let result = {
            let _placeholder = Placeholder::show(&self.renderer);
            self.dispatcher.dispatch_with_file(content, kind, file).await
        };

        match result {
            Ok(reply) => {
                let reply = self.renderer.append(&MessageRecord::assistant(reply));
                SendOutcome::Replied { user, reply }
            }
            Err(error) => {
                log::warn!("{} send failed: {error}", kind.as_str());
                let error_unit = self.render_error(&error, kind);
                SendOutcome::Failed {
                    user,
                    error,
                    error_unit,
                }
            }
        }
    }

    /// Render the chat line for a failure that happened while handling a `kind` message.
    pub fn render_error(&self, error: &ChatError, kind: MessageKind) -> UnitId {
        self.renderer
            .append(&MessageRecord::assistant(error.user_message(kind)))
    }

    pub fn render_inbound(&self, record: &MessageRecord) -> UnitId {
        self.renderer.append(record)
    }

    /// Replace the display list with `records`, oldest first. Returns how many were shown.
    pub fn load_history(&self, records: impl IntoIterator<Item = MessageRecord>) -> usize {
        self.renderer.clear();
        records
            .into_iter()
            .filter(|r| !r.content.is_empty())
            .map(|r| self.renderer.append(&r))
            .count()
    }
}
