use crate::engine::ChatEngine;
use crate::renderer::UnitId;
use chatrelay_core::types::Role;
use chatrelay_providers::realtime::RealtimeEvent;
use chatrelay_providers::supabase::ChatRow;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub forwarded: usize,
    pub skipped: usize,
}

/// Pushes rows inserted by the backend into the display list.
///
/// The user's own messages come back through the feed as well; they were
/// already rendered optimistically, so rows with role "user" are dropped.
pub struct RealtimeSync {
    engine: Arc<ChatEngine>,
}

impl RealtimeSync {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    pub fn forward_row(&self, row: &ChatRow) -> Option<UnitId> {
        if !row.belongs_to(self.engine.session()) {
            log::debug!("realtime row for another session ignored");
            return None;
        }
        if row.role() == Role::User {
            return None;
        }
        let record = row.to_record()?;
        Some(self.engine.render_inbound(&record))
    }

    /// Consume feed events until the subscription ends. Never reconnects.
    pub async fn run(self, mut events: mpsc::Receiver<RealtimeEvent>) -> SyncStats {
        let mut stats = SyncStats::default();

        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::Subscribed => {
                    log::info!(
                        "realtime subscribed for session {}",
                        self.engine.session().short()
                    );
                }
                RealtimeEvent::Insert(row) => match self.forward_row(&row) {
                    Some(_) => stats.forwarded += 1,
                    None => stats.skipped += 1,
                },
                RealtimeEvent::ChannelError(e) => {
                    log::error!("realtime channel error: {e}");
                }
                RealtimeEvent::Closed => {
                    log::error!("realtime channel closed; continuing in send-only mode");
                    break;
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::renderer::Renderer;
    use crate::traits::{AlwaysOnline, HttpTransport};
    use async_trait::async_trait;
    use chatrelay_core::types::SessionId;
    use chatrelay_providers::request::HttpRequest;
    use chatrelay_providers::runtime::{HttpError, HttpResponse};
    use chatrelay_providers::supabase::RowMessage;

    struct NoNetwork;

    #[async_trait]
    impl HttpTransport for NoNetwork {
        async fn execute(&self, _req: &HttpRequest) -> Result<HttpResponse, HttpError> {
            Err(HttpError::Unreachable("unused".into()))
        }
    }

    fn engine() -> Arc<ChatEngine> {
        Arc::new(ChatEngine::new(
            Renderer::new(),
            Dispatcher::new(Arc::new(NoNetwork), "http://hook.invalid", SessionId::new("s1")),
            Arc::new(AlwaysOnline),
        ))
    }

    fn row(session: &str, role: &str, content: &str) -> ChatRow {
        ChatRow {
            session_id: Some(session.into()),
            message: Some(RowMessage {
                role: Some(role.into()),
                content: Some(content.into()),
                ..Default::default()
            }),
            created_at: None,
        }
    }

    fn memory_row(session: &str, kind: &str, content: &str) -> ChatRow {
        ChatRow {
            session_id: Some(session.into()),
            message: Some(RowMessage {
                kind: Some(kind.into()),
                content: Some(content.into()),
                ..Default::default()
            }),
            created_at: None,
        }
    }

    #[test]
    fn user_rows_are_never_forwarded() {
        let engine = engine();
        let sync = RealtimeSync::new(engine.clone());
        assert!(sync.forward_row(&row("s1", "user", "echo")).is_none());
        assert!(engine.renderer().is_empty());
    }

    #[test]
    fn human_memory_rows_are_treated_as_echoes() {
        let engine = engine();
        let sync = RealtimeSync::new(engine.clone());
        assert!(sync.forward_row(&memory_row("s1", "human", "my question")).is_none());
        assert!(sync.forward_row(&memory_row("s1", "ai", "the answer")).is_some());

        let units = engine.renderer().snapshot();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].message.role, Role::Assistant);
        assert_eq!(units[0].message.summary, "the answer");
    }

    #[test]
    fn assistant_rows_for_this_session_are_rendered() {
        let engine = engine();
        let sync = RealtimeSync::new(engine.clone());
        assert!(sync.forward_row(&row("s1", "assistant", "hi")).is_some());
        assert!(sync.forward_row(&row("other", "assistant", "not mine")).is_none());

        let units = engine.renderer().snapshot();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].message.summary, "hi");
    }

    #[tokio::test]
    async fn run_forwards_until_closed() {
        let engine = engine();
        let (tx, rx) = mpsc::channel(8);
        tx.send(RealtimeEvent::Subscribed).await.unwrap();
        tx.send(RealtimeEvent::Insert(row("s1", "user", "mine")))
            .await
            .unwrap();
        tx.send(RealtimeEvent::Insert(row("s1", "ai", "reply")))
            .await
            .unwrap();
        tx.send(RealtimeEvent::ChannelError("hiccup".into()))
            .await
            .unwrap();
        tx.send(RealtimeEvent::Closed).await.unwrap();
        tx.send(RealtimeEvent::Insert(row("s1", "ai", "after close")))
            .await
            .unwrap();

        let stats = RealtimeSync::new(engine.clone()).run(rx).await;
        assert_eq!(
            stats,
            SyncStats {
                forwarded: 1,
                skipped: 1
            }
        );
        assert_eq!(engine.renderer().len(), 1);
    }
}
