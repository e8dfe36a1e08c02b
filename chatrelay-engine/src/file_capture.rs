use crate::engine::ChatEngine;
use crate::session::{FileOutcome, FileStage, SendOutcome};
use crate::traits::FileSource;
use chatrelay_core::codec::encode_media;
use chatrelay_core::error::{ChatError, ValidationError};
use chatrelay_core::types::MessageKind;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub fn validate_file(size: u64, mime_type: &str) -> Result<(), ValidationError> {
    if size > MAX_FILE_BYTES {
        return Err(ValidationError::FileTooLarge {
            size,
            max: MAX_FILE_BYTES,
        });
    }
    let mime = mime_type.trim().to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::UnsupportedFileType(mime_type.to_string()));
    }
    Ok(())
}

/// idle -> validating -> reading -> dispatching -> idle
pub struct FileController {
    engine: Arc<ChatEngine>,
    enabled: bool,
    stage: Mutex<FileStage>,
}

/// Puts the controller back to idle on every exit path.
struct StageReset<'a>(&'a FileController);

impl Drop for StageReset<'_> {
    fn drop(&mut self) {
        self.0.set_stage(FileStage::Idle);
    }
}

impl FileController {
    pub fn new(engine: Arc<ChatEngine>, enabled: bool) -> Self {
        Self {
            engine,
            enabled,
            stage: Mutex::new(FileStage::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FileStage> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_stage(&self, stage: FileStage) {
        *self.lock() = stage;
    }

    pub fn stage(&self) -> FileStage {
        *self.lock()
    }

    pub async fn handle_selection(&self, file: &dyn FileSource) -> FileOutcome {
        if !self.enabled {
            log::warn!("file upload is disabled; ignoring {}", file.name());
            return FileOutcome::Disabled;
        }

        {
            let mut stage = self.lock();
            if *stage != FileStage::Idle {
                log::warn!("file upload already in progress; ignoring {}", file.name());
                return FileOutcome::Busy;
            }
            *stage = FileStage::Validating;
        }
        let _reset = StageReset(self);

        if let Err(e) = validate_file(file.size(), file.mime_type()) {
            log::warn!("rejected {}: {e}", file.name());
            self.engine
                .render_error(&ChatError::from(e.clone()), MessageKind::Image);
            return FileOutcome::Rejected(e);
        }

        if !self.engine.is_online() {
            let notice = self.engine.render_error(&ChatError::Offline, MessageKind::Image);
            return FileOutcome::Sent(SendOutcome::Offline { notice });
        }

        self.set_stage(FileStage::Reading);
        let bytes = match file.read().await {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to read {}: {e:#}", file.name());
                self.engine.render_error(
                    &ChatError::Decode(format!("{e:#}")),
                    MessageKind::Image,
                );
                return FileOutcome::ReadFailed;
            }
        };
        let payload = encode_media(&bytes);

        self.set_stage(FileStage::Dispatching);
        let meta = json!({
            "name": file.name(),
            "size": file.size(),
            "type": file.mime_type(),
        });
        let sent = self
            .engine
            .send_media(
                &payload,
                MessageKind::Image,
                Some(file.mime_type()),
                Some(meta),
            )
            .await;
        FileOutcome::Sent(sent)
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl HttpTransport for Counting {
        async fn execute(&self, _req: &HttpRequest) -> Result<HttpResponse, HttpError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                content_type: None,
                body: br#"{"output":"nice cat"}"#.to_vec(),
            })
        }
    }

    struct FakeFile {
        size: u64,
        mime: &'static str,
        bytes: Option<Vec<u8>>,
    }

    #[async_trait]
    impl FileSource for FakeFile {
        fn name(&self) -> &str {
            "cat.png"
        }
        fn size(&self) -> u64 {
            self.size
        }
        fn mime_type(&self) -> &str {
            self.mime
        }
        async fn read(&self) -> anyhow::Result<Vec<u8>> {
            self.bytes
                .clone()
                .ok_or_else(|| anyhow::anyhow!("disk on fire"))
        }
    }

    fn controller(enabled: bool) -> (FileController, Arc<Counting>, Renderer) {
        let transport = Arc::new(Counting(AtomicUsize::new(0)));
        let renderer = Renderer::new();
        let engine = Arc::new(ChatEngine::new(
            renderer.clone(),
            Dispatcher::new(transport.clone(), "http://hook.invalid", SessionId::new("s")),
            Arc::new(AlwaysOnline),
        ));
        (FileController::new(engine, enabled), transport, renderer)
    }

    #[test]
    fn validation_limits() {
        assert!(validate_file(MAX_FILE_BYTES, "image/png").is_ok());
        assert!(validate_file(1, "IMAGE/JPEG").is_ok());
        assert!(matches!(
            validate_file(MAX_FILE_BYTES + 1, "image/png"),
            Err(ValidationError::FileTooLarge { .. })
        ));
        assert!(matches!(
            validate_file(1, "application/pdf"),
            Err(ValidationError::UnsupportedFileType(_))
        ));
    }

    #[tokio::test]
    async fn eleven_megabytes_is_rejected_without_dispatch() {
        let (ctl, transport, renderer) = controller(true);
        let file = FakeFile {
            size: 11 * 1024 * 1024,
            mime: "image/png",
            bytes: Some(vec![0; 4]),
        };

        let out = ctl.handle_selection(&file).await;
        assert!(matches!(
            out,
            FileOutcome::Rejected(ValidationError::FileTooLarge { .. })
        ));
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.stage(), FileStage::Idle);

        let units = renderer.snapshot();
        assert_eq!(units.len(), 1);
        assert!(units[0].message.summary.contains("10MB"));
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let (ctl, transport, _) = controller(true);
        let file = FakeFile {
            size: 10,
            mime: "text/plain",
            bytes: Some(vec![0; 4]),
        };
        assert!(matches!(
            ctl.handle_selection(&file).await,
            FileOutcome::Rejected(ValidationError::UnsupportedFileType(_))
        ));
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn read_failure_renders_error_and_returns_to_idle() {
        let (ctl, transport, renderer) = controller(true);
        let file = FakeFile {
            size: 10,
            mime: "image/png",
            bytes: None,
        };
        assert_eq!(ctl.handle_selection(&file).await, FileOutcome::ReadFailed);
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.stage(), FileStage::Idle);
        assert_eq!(renderer.snapshot()[0].message.summary, "Error reading file.");
    }

    #[tokio::test]
    async fn valid_image_is_dispatched() {
        let (ctl, transport, renderer) = controller(true);
        let file = FakeFile {
            size: 300,
            mime: "image/png",
            bytes: Some(vec![7; 300]),
        };
        let out = ctl.handle_selection(&file).await;
        assert!(matches!(out, FileOutcome::Sent(SendOutcome::Replied { .. })));
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.stage(), FileStage::Idle);

        let units = renderer.snapshot();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].message.summary, "nice cat");
    }

    #[tokio::test]
    async fn disabled_controller_does_nothing() {
        let (ctl, transport, renderer) = controller(false);
        let file = FakeFile {
            size: 300,
            mime: "image/png",
            bytes: Some(vec![7; 300]),
        };
        assert_eq!(ctl.handle_selection(&file).await, FileOutcome::Disabled);
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
        assert!(renderer.is_empty());
    }
}
