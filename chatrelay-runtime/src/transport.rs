use anyhow::{Context, anyhow};
use chatrelay_core::config::SupabaseSettings;
use chatrelay_core::types::{MessageRecord, SessionId};
use chatrelay_engine::traits::{HttpTransport, NetworkStatus};
use chatrelay_providers::parse::parse_history_rows;
use chatrelay_providers::request::HttpRequest;
use chatrelay_providers::runtime::{HttpError, HttpResponse, execute_with_timeouts};
use chatrelay_providers::supabase::build_history_request;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ReqwestTransport {
    pub fn with_timeouts(connect_timeout: Duration, timeout: Duration) -> Self {
        Self {
            connect_timeout,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, HttpError> {
        execute_with_timeouts(req, self.connect_timeout, self.timeout).await
    }
}

/// Connectivity flag flipped by the host (e.g. on OS network change events).
#[derive(Debug)]
pub struct SharedNetworkStatus {
    online: AtomicBool,
}

impl Default for SharedNetworkStatus {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }
}

impl SharedNetworkStatus {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Fetch the stored conversation for `session`, oldest first.
///
/// Rows without content are dropped.
pub async fn load_history(
    transport: &dyn HttpTransport,
    settings: &SupabaseSettings,
    session: &SessionId,
) -> anyhow::Result<Vec<MessageRecord>> {
    let req = build_history_request(settings, session)?;
    let resp = transport
        .execute(&req)
        .await
        .context("fetch chat history")?;

    if !resp.is_success() {
        return Err(anyhow!(
            "history request failed: status={} body={}",
            resp.status,
            String::from_utf8_lossy(&resp.body)
        ));
    }

    let rows = parse_history_rows(&resp.body)?;
    Ok(rows.iter().filter_map(|r| r.to_record()).collect())
}
