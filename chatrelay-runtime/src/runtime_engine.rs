use std::sync::Arc;

use anyhow::{Context, anyhow};
use chatrelay_core::config::{SupabaseSettings, WidgetConfig};
use chatrelay_core::types::SessionId;
use chatrelay_engine::dispatcher::Dispatcher;
use chatrelay_engine::engine::ChatEngine;
use chatrelay_engine::renderer::Renderer;
use chatrelay_engine::sync::{RealtimeSync, SyncStats};
use chatrelay_engine::traits::{HttpTransport, NetworkStatus};
use chatrelay_providers::realtime::{RealtimeConfig, RealtimeHandle, spawn_realtime_subscription};
use tokio::task::JoinHandle;

/// Build a send-ready engine from a validated config.
pub fn build_engine_from_config(
    cfg: &WidgetConfig,
    session: SessionId,
    transport: Arc<dyn HttpTransport>,
    network: Arc<dyn NetworkStatus>,
) -> anyhow::Result<Arc<ChatEngine>> {
    cfg.validate()?;
    let webhook_url = cfg
        .webhook_url()
        .ok_or_else(|| anyhow!("webhook URL is not configured"))?;

    let dispatcher = Dispatcher::new(transport, webhook_url, session);
    Ok(Arc::new(ChatEngine::new(Renderer::new(), dispatcher, network)))
}

pub struct RealtimeTask {
    pub handle: RealtimeHandle,
    pub join: JoinHandle<SyncStats>,
}

impl RealtimeTask {
    pub async fn shutdown(self) -> SyncStats {
        self.handle.shutdown().await;
        self.join.await.unwrap_or_default()
    }
}

/// Subscribe to inserts for the engine's session and feed them into its renderer.
pub async fn start_realtime(
    engine: Arc<ChatEngine>,
    settings: &SupabaseSettings,
) -> anyhow::Result<RealtimeTask> {
    let cfg = RealtimeConfig::for_session(settings, engine.session().clone())?;
    let (handle, events) = spawn_realtime_subscription(cfg)
        .await
        .context("start realtime subscription")?;

    let join = tokio::spawn(RealtimeSync::new(engine).run(events));
    Ok(RealtimeTask { handle, join })
}
