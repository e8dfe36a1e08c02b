use chatrelay_core::codec::data_uri;
use chatrelay_core::content::{ContentClass, classify_content};
use chatrelay_core::text::escape_markup;
use chatrelay_core::types::{MessageRecord, Role, TYPING_SENTINEL};
use chrono::Local;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Distance from the bottom (in px) under which the view still counts as "at the bottom".
pub const NEAR_BOTTOM_THRESHOLD_PX: f64 = 150.0;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";
pub const IMAGE_ALT_TEXT: &str = "Sent image";
pub const IMAGE_FALLBACK_TEXT: &str = "Image failed to load";

// The recorder's container is not known on the receiving side; offer all of them.
pub const AUDIO_SOURCE_TYPES: [&str; 3] = ["audio/webm", "audio/ogg", "audio/wav"];

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSource {
    pub src: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitBody {
    /// Already escaped, line breaks as `<br>`.
    Text { html: String },
    Image {
        src: String,
        alt: String,
        fallback: String,
    },
    Audio {
        sources: Vec<AudioSource>,
        size_kb: u64,
    },
    Typing,
}

/// A message record turned into something displayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub role: Role,
    pub body: UnitBody,
    /// `HH:MM`, local clock.
    pub timestamp: String,
    /// Single-line form for terminals and logs.
    pub summary: String,
}

fn attr(value: &str) -> String {
    escape_markup(value).replace('"', "&quot;")
}

impl RenderedMessage {
    pub fn is_typing(&self) -> bool {
        matches!(self.body, UnitBody::Typing)
    }

    pub fn to_html(&self) -> String {
        let inner = match &self.body {
            UnitBody::Text { html } => format!("<div>{html}</div>"),
            UnitBody::Image { src, alt, fallback } => format!(
                "<img src=\"{}\" alt=\"{}\" loading=\"lazy\"><div class=\"image-fallback\" hidden>{}</div>",
                attr(src),
                attr(alt),
                escape_markup(fallback),
            ),
            UnitBody::Audio { sources, size_kb } => {
                let sources: String = sources
                    .iter()
                    .map(|s| {
                        format!(
                            "<source src=\"{}\" type=\"{}\">",
                            attr(&s.src),
                            attr(&s.mime_type)
                        )
                    })
                    .collect();
                format!(
                    "<div class=\"audio-label\">Audio ({size_kb}KB)</div><audio controls preload=\"metadata\">{sources}</audio>"
                )
            }
            UnitBody::Typing => format!(
                "<div class=\"typing-bubble\" role=\"status\" aria-live=\"polite\">{}</div>",
                escape_markup(TYPING_SENTINEL)
            ),
        };

        format!(
            "<div class=\"message {}\">{inner}<div class=\"timestamp\">{}</div></div>",
            self.role.as_str(),
            escape_markup(&self.timestamp)
        )
    }
}

/// Pure: decide how `record` is shown.
pub fn render_record(record: &MessageRecord) -> RenderedMessage {
    let content = record.content.as_str();

    let (body, summary) = match classify_content(content, record.media_kind) {
        ContentClass::Audio => {
            let sources = AUDIO_SOURCE_TYPES
                .iter()
                .map(|mime| AudioSource {
                    src: data_uri(mime, content),
                    mime_type: (*mime).to_string(),
                })
                .collect();
            let size_kb = (content.len() as f64 / 1000.0).round() as u64;
            (
                UnitBody::Audio { sources, size_kb },
                format!("[audio {size_kb}KB]"),
            )
        }
        ContentClass::Image => {
            let mime = record
                .mime_type
                .as_deref()
                .filter(|m| m.starts_with("image/"))
                .unwrap_or(DEFAULT_IMAGE_MIME);
            (
                UnitBody::Image {
                    src: data_uri(mime, content),
                    alt: IMAGE_ALT_TEXT.into(),
                    fallback: IMAGE_FALLBACK_TEXT.into(),
                },
                format!("[image {mime}]"),
            )
        }
        ContentClass::Typing => (UnitBody::Typing, TYPING_SENTINEL.to_string()),
        ContentClass::Text => (
            UnitBody::Text {
                html: escape_markup(content),
            },
            content.to_string(),
        ),
    };

    RenderedMessage {
        role: record.role,
        body,
        timestamp: record
            .created_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string(),
        summary,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayUnit {
    pub id: UnitId,
    #[serde(flatten)]
    pub message: RenderedMessage,
}

/// Scroll geometry of the message pane as last reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn is_near_bottom(&self) -> bool {
        self.scroll_height - self.scroll_top - self.client_height < NEAR_BOTTOM_THRESHOLD_PX
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Appended { unit: DisplayUnit, auto_scroll: bool },
    Removed(UnitId),
    Cleared,
}

#[derive(Debug, Default)]
struct RendererState {
    units: Vec<DisplayUnit>,
    next_id: u64,
    viewport: Viewport,
}

/// The ordered display list. Cloning yields another handle to the same list.
#[derive(Clone)]
pub struct Renderer {
    state: Arc<Mutex<RendererState>>,
    events: broadcast::Sender<DisplayEvent>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(RendererState::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: DisplayEvent) {
        // No subscribers is fine: the list itself is the source of truth.
        let _ = self.events.send(event);
    }

    // Events are published under the list lock so subscribers see them in
    // the same order as `snapshot()`.
    pub fn append(&self, record: &MessageRecord) -> UnitId {
        let message = render_record(record);
        let mut st = self.lock();
        let auto_scroll = st.viewport.is_near_bottom() || message.role == Role::User;
        st.next_id += 1;
        let unit = DisplayUnit {
            id: UnitId(st.next_id),
            message,
        };
        let id = unit.id;
        st.units.push(unit.clone());
        self.publish(DisplayEvent::Appended { unit, auto_scroll });
        id
    }

    /// Returns false when the unit is already gone.
    pub fn remove(&self, id: UnitId) -> bool {
        let mut st = self.lock();
        let before = st.units.len();
        st.units.retain(|u| u.id != id);
        let removed = st.units.len() != before;
        if removed {
            self.publish(DisplayEvent::Removed(id));
        }
        removed
    }

    pub fn clear(&self) {
        let mut st = self.lock();
        st.units.clear();
        self.publish(DisplayEvent::Cleared);
    }

    pub fn snapshot(&self) -> Vec<DisplayUnit> {
        self.lock().units.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.lock().viewport = viewport;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::types::MediaKind;

    fn payload() -> String {
        "QUJD".repeat(50)
    }

    fn scrolled_up() -> Viewport {
        Viewport {
            scroll_height: 2000.0,
            scroll_top: 200.0,
            client_height: 600.0,
        }
    }

    #[test]
    fn script_tags_are_never_live_markup() {
        let rec = MessageRecord::assistant("<script>alert(1)</script>\nbye");
        let html = render_record(&rec).to_html();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;<br>bye"));
    }

    #[test]
    fn audio_record_renders_player_with_all_sources() {
        let rec = MessageRecord::user(payload()).with_media(MediaKind::Audio);
        let out = render_record(&rec);
        let UnitBody::Audio { sources, size_kb } = &out.body else {
            panic!("expected audio, got {:?}", out.body);
        };
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].mime_type, "audio/webm");
        assert!(sources[0].src.starts_with("data:audio/webm;base64,QUJD"));
        assert_eq!(*size_kb, 0);
        assert!(out.to_html().contains("<audio controls"));
    }

    #[test]
    fn image_record_uses_mime_or_png() {
        let rec = MessageRecord::user(payload()).with_media(MediaKind::Image);
        let out = render_record(&rec);
        let UnitBody::Image { src, fallback, .. } = &out.body else {
            panic!("expected image");
        };
        assert!(src.starts_with("data:image/png;base64,"));
        assert_eq!(fallback, IMAGE_FALLBACK_TEXT);

        let rec = rec.with_mime_type("image/webp");
        let UnitBody::Image { src, .. } = render_record(&rec).body else {
            panic!("expected image");
        };
        assert!(src.starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn media_kind_without_encoded_payload_is_text() {
        let rec = MessageRecord::assistant("short").with_media(MediaKind::Audio);
        assert!(matches!(render_record(&rec).body, UnitBody::Text { .. }));
    }

    #[test]
    fn typing_sentinel_renders_placeholder() {
        let out = render_record(&MessageRecord::typing());
        assert!(out.is_typing());
        assert!(out.to_html().contains("typing-bubble"));
    }

    #[test]
    fn timestamp_is_hours_and_minutes() {
        let ts = render_record(&MessageRecord::user("hi")).timestamp;
        assert_eq!(ts.len(), 5);
        assert_eq!(&ts[2..3], ":");
    }

    #[test]
    fn append_remove_keep_order() {
        let r = Renderer::new();
        let a = r.append(&MessageRecord::user("a"));
        let b = r.append(&MessageRecord::assistant("b"));
        let c = r.append(&MessageRecord::assistant("c"));
        assert!(r.remove(b));
        assert!(!r.remove(b));

        let ids: Vec<UnitId> = r.snapshot().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![a, c]);

        r.clear();
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn inbound_messages_do_not_scroll_a_reader_away() {
        let r = Renderer::new();
        let mut events = r.subscribe();
        r.set_viewport(scrolled_up());

        r.append(&MessageRecord::assistant("background"));
        r.append(&MessageRecord::user("mine"));

        let DisplayEvent::Appended { auto_scroll, .. } = events.recv().await.unwrap() else {
            panic!("expected append");
        };
        assert!(!auto_scroll);
        let DisplayEvent::Appended { auto_scroll, .. } = events.recv().await.unwrap() else {
            panic!("expected append");
        };
        assert!(auto_scroll);
    }

    #[tokio::test]
    async fn near_bottom_viewport_follows_new_messages() {
        let r = Renderer::new();
        let mut events = r.subscribe();
        r.set_viewport(Viewport {
            scroll_height: 2000.0,
            scroll_top: 1300.0,
            client_height: 600.0,
        });

        let id = r.append(&MessageRecord::assistant("hello"));
        assert_eq!(
            events.recv().await.unwrap(),
            DisplayEvent::Appended {
                unit: r.snapshot()[0].clone(),
                auto_scroll: true
            }
        );
        r.remove(id);
        assert_eq!(events.recv().await.unwrap(), DisplayEvent::Removed(id));
    }

    #[test]
    fn concurrent_appends_publish_in_list_order() {
        let renderer = Renderer::new();
        let mut events = renderer.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let r = renderer.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        r.append(&MessageRecord::assistant(format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut published = vec![];
        while let Ok(ev) = events.try_recv() {
            if let DisplayEvent::Appended { unit, .. } = ev {
                published.push(unit.id);
            }
        }
        let listed: Vec<UnitId> = renderer.snapshot().iter().map(|u| u.id).collect();
        assert_eq!(published.len(), 200);
        assert_eq!(published, listed);
    }
}
