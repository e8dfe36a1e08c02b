use crate::supabase::ChatRow;
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    output: Option<serde_json::Value>,
}

/// Extract `output` from a webhook reply.
///
/// `Ok(None)` means the reply was valid JSON but carried nothing to show.
pub fn parse_webhook_reply(body: &[u8]) -> anyhow::Result<Option<String>> {
    let reply: WebhookReply = serde_json::from_slice(body).context("decode webhook reply JSON")?;

    let text = match reply.output {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    Ok(text.filter(|s| !s.trim().is_empty()))
}

/// Decode a history response row by row; rows that do not fit are logged and dropped.
pub fn parse_history_rows(body: &[u8]) -> anyhow::Result<Vec<ChatRow>> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_slice(body).context("decode history rows JSON")?;

    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value::<ChatRow>(v) {
            Ok(row) => Some(row),
            Err(e) => {
                log::warn!("skipping history row {i}: {e}");
                None
            }
        })
        .collect())
}
