//
// Supabase Realtime (Phoenix channel protocol) change-feed subscription.
//
// One websocket per chat session, one channel joined on it, INSERT events only.
// There is no reconnect: when the socket drops the caller sees `Closed` and the
// chat keeps working in send-only mode.

use std::time::Duration;

use anyhow::{Context, anyhow};
use chatrelay_core::config::SupabaseSettings;
use chatrelay_core::types::SessionId;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::supabase::ChatRow;

pub const CHANNEL_TOPIC: &str = "realtime:chat_changes";
const PHOENIX_TOPIC: &str = "phoenix";
const JOIN_REF: &str = "1";
const WS_SEND_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub ws_url: Url,
    pub api_key: String,
    pub schema: String,
    pub table: String,
    pub session_id: SessionId,

    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The websocket URL carries the key as a query parameter.
        let mut url = self.ws_url.clone();
        url.set_query(None);
        f.debug_struct("RealtimeConfig")
            .field("ws_url", &url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl RealtimeConfig {
    pub fn for_session(settings: &SupabaseSettings, session_id: SessionId) -> anyhow::Result<Self> {
        Ok(Self {
            ws_url: build_realtime_ws_url(&settings.url, &settings.key)?,
            api_key: settings.key.clone(),
            schema: "public".into(),
            table: settings.table.clone(),
            session_id,
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
        })
    }
}

/// `https://<project>.supabase.co` -> `wss://<project>.supabase.co/realtime/v1/websocket?...`
pub fn build_realtime_ws_url(project_url: &str, api_key: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(project_url)
        .with_context(|| format!("invalid Supabase URL: {project_url}"))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(anyhow!("unsupported Supabase URL scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {project_url} to {scheme}"))?;

    url.set_path("/realtime/v1/websocket");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Subscribed,
    Insert(ChatRow),
    ChannelError(String),
    Closed,
}

#[derive(Debug)]
enum RealtimeCmd {
    Shutdown,
}

#[derive(Clone)]
pub struct RealtimeHandle {
    tx: mpsc::Sender<RealtimeCmd>,
}

impl RealtimeHandle {
    pub async fn shutdown(&self) {
        let _ = self.tx.send(RealtimeCmd::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn build_join_message(cfg: &RealtimeConfig) -> String {
    json!({
        "topic": CHANNEL_TOPIC,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": cfg.schema,
                    "table": cfg.table,
                    "filter": format!("session_id=eq.{}", cfg.session_id.as_str()),
                }],
            },
            "access_token": cfg.api_key,
        },
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
    .to_string()
}

fn build_heartbeat_message(msg_ref: u64) -> String {
    json!({
        "topic": PHOENIX_TOPIC,
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedRealtime {
    JoinReply { ok: bool, reason: String },
    Insert(ChatRow),
    ChannelError(String),
    ChannelClosed,
    Ignored,
}

fn parse_realtime_message(s: &str) -> anyhow::Result<ParsedRealtime> {
    let v: serde_json::Value = serde_json::from_str(s).context("decode realtime json")?;
    let event = v
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing event"))?;
    let topic = v.get("topic").and_then(|v| v.as_str()).unwrap_or("");

    if topic != CHANNEL_TOPIC {
        // Heartbeat replies and other channels.
        return Ok(ParsedRealtime::Ignored);
    }

    match event {
        "phx_reply" => {
            let is_join = v.get("ref").and_then(|r| r.as_str()) == Some(JOIN_REF);
            if !is_join {
                return Ok(ParsedRealtime::Ignored);
            }
            let payload = v.get("payload").cloned().unwrap_or_default();
            let ok = payload.get("status").and_then(|s| s.as_str()) == Some("ok");
            let reason = payload
                .get("response")
                .and_then(|r| r.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or("")
                .to_string();
            Ok(ParsedRealtime::JoinReply { ok, reason })
        }
        "postgres_changes" => {
            let data = v
                .get("payload")
                .and_then(|p| p.get("data"))
                .ok_or_else(|| anyhow!("postgres_changes without data"))?;
            if data.get("type").and_then(|t| t.as_str()) != Some("INSERT") {
                return Ok(ParsedRealtime::Ignored);
            }
            let record = data
                .get("record")
                .cloned()
                .ok_or_else(|| anyhow!("INSERT without record"))?;
            let row: ChatRow = serde_json::from_value(record).context("decode inserted row")?;
            Ok(ParsedRealtime::Insert(row))
        }
        "phx_error" => Ok(ParsedRealtime::ChannelError("channel error".into())),
        "phx_close" => Ok(ParsedRealtime::ChannelClosed),
        "system" => {
            let payload = v.get("payload").cloned().unwrap_or_default();
            if payload.get("status").and_then(|s| s.as_str()) == Some("error") {
                let message = payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("system error")
                    .to_string();
                Ok(ParsedRealtime::ChannelError(message))
            } else {
                Ok(ParsedRealtime::Ignored)
            }
        }
        _ => Ok(ParsedRealtime::Ignored),
    }
}

pub async fn spawn_realtime_subscription(
    cfg: RealtimeConfig,
) -> anyhow::Result<(RealtimeHandle, mpsc::Receiver<RealtimeEvent>)> {
    if cfg.api_key.trim().is_empty() {
        return Err(anyhow!("missing Supabase key"));
    }

    let (ws, _resp) = tokio::time::timeout(
        cfg.connect_timeout,
        tokio_tungstenite::connect_async(cfg.ws_url.as_str()),
    )
    .await
    .map_err(|_| anyhow!("realtime connect timed out"))?
    .context("connect realtime websocket")?;

    let (mut ws_write, mut ws_read) = ws.split();

    tokio::time::timeout(
        WS_SEND_TIMEOUT,
        ws_write.send(Message::Text(build_join_message(&cfg).into())),
    )
    .await
    .map_err(|_| anyhow!("realtime join timed out"))?
    .context("send channel join")?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<RealtimeCmd>(8);
    let (evt_tx, evt_rx) = mpsc::channel::<RealtimeEvent>(64);

    let heartbeat_interval = cfg.heartbeat_interval;

    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + heartbeat_interval,
            heartbeat_interval,
        );
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(RealtimeCmd::Shutdown) | None => break,
                    }
                }

                _ = heartbeat.tick() => {
                    let msg = build_heartbeat_message(next_ref);
                    next_ref = next_ref.saturating_add(1);
                    let res = tokio::time::timeout(WS_SEND_TIMEOUT, ws_write.send(Message::Text(msg.into()))).await;
                    if !matches!(res, Ok(Ok(()))) {
                        let _ = evt_tx.send(RealtimeEvent::ChannelError("heartbeat failed".into())).await;
                        break;
                    }
                }

                msg = ws_read.next() => {
                    let Some(msg) = msg else { break; };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => {
                            let _ = evt_tx.send(RealtimeEvent::ChannelError(format!("websocket read failed: {e}"))).await;
                            break;
                        }
                    };

                    let text = match msg {
                        Message::Text(t) => t.to_string(),
                        Message::Binary(b) => String::from_utf8_lossy(&b).to_string(),
                        Message::Ping(p) => {
                            let _ = ws_write.send(Message::Pong(p)).await;
                            continue;
                        }
                        Message::Close(_) => break,
                        _ => continue,
                    };

                    match parse_realtime_message(&text) {
                        Ok(ParsedRealtime::JoinReply { ok: true, .. }) => {
                            let _ = evt_tx.send(RealtimeEvent::Subscribed).await;
                        }
                        Ok(ParsedRealtime::JoinReply { ok: false, reason }) => {
                            let _ = evt_tx.send(RealtimeEvent::ChannelError(format!("join rejected: {reason}"))).await;
                        }
                        Ok(ParsedRealtime::Insert(row)) => {
                            let _ = evt_tx.send(RealtimeEvent::Insert(row)).await;
                        }
                        Ok(ParsedRealtime::ChannelError(e)) => {
                            let _ = evt_tx.send(RealtimeEvent::ChannelError(e)).await;
                        }
                        Ok(ParsedRealtime::ChannelClosed) => break,
                        Ok(ParsedRealtime::Ignored) => {}
                        Err(e) => {
                            log::debug!("ignoring realtime frame: {e:#}");
                        }
                    }
                }
            }
        }

        let _ = ws_write.send(Message::Close(None)).await;
        let _ = evt_tx.send(RealtimeEvent::Closed).await;
    });

    Ok((RealtimeHandle { tx: cmd_tx }, evt_rx))
}
