use std::sync::{Arc, Mutex, PoisonError};

use chatrelay_core::config::WidgetConfig;
use chatrelay_core::types::SessionId;
use chatrelay_engine::audio_capture::AudioController;
use chatrelay_engine::engine::ChatEngine;
use chatrelay_engine::file_capture::FileController;
use chatrelay_engine::renderer::{DisplayEvent, Renderer};
use chatrelay_engine::session::{AudioOutcome, FileOutcome, SendOutcome};
use chatrelay_engine::sync::SyncStats;
use chatrelay_engine::traits::{FileSource, HttpTransport, Microphone, NetworkStatus};
use chatrelay_runtime::runtime_engine::{RealtimeTask, build_engine_from_config, start_realtime};
use chatrelay_runtime::transport::load_history;
use tokio::sync::broadcast;

/// One mounted chat widget: engine plus the capture controllers and the
/// realtime subscription for its session.
pub struct ChatService {
    cfg: WidgetConfig,
    engine: Arc<ChatEngine>,
    files: FileController,
    audio: AudioController,
    realtime: Mutex<Option<RealtimeTask>>,
}

impl ChatService {
    /// Start a fresh session.
    ///
    /// History and realtime are best-effort: failures are logged and the
    /// widget still comes up send-ready.
    pub async fn start(
        cfg: WidgetConfig,
        transport: Arc<dyn HttpTransport>,
        network: Arc<dyn NetworkStatus>,
        microphone: Arc<dyn Microphone>,
    ) -> anyhow::Result<Self> {
        let session = SessionId::generate();
        log::info!("starting chat session {}", session.short());

        let engine = build_engine_from_config(&cfg, session, transport.clone(), network)?;

        let mut realtime = None;
        if let Some(settings) = cfg.supabase() {
            match load_history(transport.as_ref(), &settings, engine.session()).await {
                Ok(records) => {
                    let n = engine.load_history(records);
                    log::debug!("loaded {n} history messages");
                }
                Err(e) => log::warn!("chat history unavailable: {e:#}"),
            }

            match start_realtime(engine.clone(), &settings).await {
                Ok(task) => realtime = Some(task),
                Err(e) => log::error!("realtime subscription failed: {e:#}"),
            }
        }

        let files = FileController::new(engine.clone(), cfg.enable_file_upload);
        let audio = AudioController::new(engine.clone(), microphone, cfg.enable_audio_recording);

        Ok(Self {
            cfg,
            engine,
            files,
            audio,
            realtime: Mutex::new(realtime),
        })
    }

    /// `start` with this platform's microphone.
    pub async fn start_with_default_microphone(
        cfg: WidgetConfig,
        transport: Arc<dyn HttpTransport>,
        network: Arc<dyn NetworkStatus>,
    ) -> anyhow::Result<Self> {
        Self::start(cfg, transport, network, chatrelay_audio::default_microphone()).await
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.cfg
    }

    pub fn title(&self) -> &str {
        self.cfg.title()
    }

    pub fn session(&self) -> &SessionId {
        self.engine.session()
    }

    pub fn engine(&self) -> &Arc<ChatEngine> {
        &self.engine
    }

    pub fn renderer(&self) -> &Renderer {
        self.engine.renderer()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.engine.renderer().subscribe()
    }

    pub fn has_realtime(&self) -> bool {
        self.realtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.audio.is_recording()
    }

    pub async fn send_text(&self, text: &str) -> SendOutcome {
        self.engine.send_text(text).await
    }

    pub async fn upload_file(&self, file: &dyn FileSource) -> FileOutcome {
        self.files.handle_selection(file).await
    }

    pub async fn toggle_recording(&self) -> AudioOutcome {
        self.audio.toggle().await
    }

    /// Release the microphone and close the realtime channel.
    pub async fn teardown(&self) -> Option<SyncStats> {
        self.audio.teardown();

        let task = self
            .realtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let stats = match task {
            Some(t) => Some(t.shutdown().await),
            None => None,
        };
        if let Some(s) = &stats {
            log::info!(
                "realtime closed: forwarded={} skipped={}",
                s.forwarded,
                s.skipped
            );
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatrelay_core::error::DeviceError;
    use chatrelay_core::types::Role;
    use chatrelay_engine::traits::{AlwaysOnline, CaptureConstraints, CaptureStream};
    use chatrelay_runtime::files::LocalFile;
    use chatrelay_runtime::transport::ReqwestTransport;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoMic;

    #[async_trait]
    impl Microphone for NoMic {
        async fn acquire(
            &self,
            _constraints: CaptureConstraints,
        ) -> Result<Box<dyn CaptureStream>, DeviceError> {
            Err(DeviceError::NotFound)
        }
    }

    fn webhook_only(server: &MockServer) -> WidgetConfig {
        WidgetConfig {
            is_use_supabase: false,
            webhook_url: Some(format!("{}/hook", server.uri())),
            chat_title: Some("Support".into()),
            ..Default::default()
        }
    }

    async fn start(cfg: WidgetConfig) -> ChatService {
        ChatService::start(
            cfg,
            Arc::new(ReqwestTransport::default()),
            Arc::new(AlwaysOnline),
            Arc::new(NoMic),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn webhook_only_service_sends_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": "pong"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let svc = start(webhook_only(&server)).await;
        assert_eq!(svc.title(), "Support");
        assert!(!svc.has_realtime());

        assert!(svc.send_text("ping").await.is_delivered());
        let units = svc.renderer().snapshot();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].message.summary, "pong");

        assert!(svc.teardown().await.is_none());
    }

    #[tokio::test]
    async fn history_is_loaded_and_realtime_failure_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chat_messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "session_id": "ignored-by-filter",
                    "message": { "role": "user", "content": "earlier question" },
                    "created_at": "2024-05-01T10:00:00Z"
                },
                {
                    "session_id": "ignored-by-filter",
                    "message": { "role": "assistant", "content": "earlier answer" },
                    "created_at": "2024-05-01T10:00:05Z"
                }
            ])))
            .mount(&server)
            .await;

        let cfg = WidgetConfig {
            is_use_supabase: true,
            supabase_url: Some(server.uri()),
            supabase_key: Some("anon".into()),
            table_name: Some("chat_messages".into()),
            webhook_url: Some(format!("{}/hook", server.uri())),
            ..Default::default()
        };
        let svc = start(cfg).await;

        let units = svc.renderer().snapshot();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].message.role, Role::User);
        assert_eq!(units[1].message.summary, "earlier answer");

        // The mock server does not speak websocket.
        assert!(!svc.has_realtime());
    }

    #[tokio::test]
    async fn missing_microphone_is_reported_in_chat() {
        let server = MockServer::start().await;
        let svc = start(webhook_only(&server)).await;

        let out = svc.toggle_recording().await;
        assert!(matches!(out, AudioOutcome::DeviceFailed(_)));
        assert!(!svc.is_recording());
        assert_eq!(svc.renderer().len(), 1);
        assert_eq!(svc.renderer().snapshot()[0].message.role, Role::Assistant);
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    #[tokio::test]
    async fn default_microphone_is_unsupported_without_cpal() {
        let server = MockServer::start().await;
        let svc = ChatService::start_with_default_microphone(
            webhook_only(&server),
            Arc::new(ReqwestTransport::default()),
            Arc::new(AlwaysOnline),
        )
        .await
        .unwrap();

        let out = svc.toggle_recording().await;
        assert_eq!(
            out,
            AudioOutcome::DeviceFailed(chatrelay_core::error::ChatError::Device(
                DeviceError::Unsupported
            ))
        );
        assert!(!svc.is_recording());
    }

    #[tokio::test]
    async fn disabled_upload_ignores_files() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cat.png");
        std::fs::write(&p, [0x89, b'P', b'N', b'G']).unwrap();

        let cfg = WidgetConfig {
            enable_file_upload: false,
            ..webhook_only(&server)
        };
        let svc = start(cfg).await;
        let file = LocalFile::open(&p).await.unwrap();
        assert_eq!(svc.upload_file(&file).await, FileOutcome::Disabled);
        assert!(svc.renderer().is_empty());
    }

    #[tokio::test]
    async fn incomplete_config_fails_to_start() {
        let res = ChatService::start(
            WidgetConfig::default(),
            Arc::new(ReqwestTransport::default()),
            Arc::new(AlwaysOnline),
            Arc::new(NoMic),
        )
        .await;
        assert!(res.is_err());
    }
}
