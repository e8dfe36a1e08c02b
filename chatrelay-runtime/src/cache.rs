//! Network-first cache for the page shell and a few allow-listed CDN assets.
//!
//! Chat traffic (webhook, database, realtime) goes to other origins and is
//! never stored, so it cannot be served stale.

use anyhow::Context;
use chatrelay_core::codec::{decode_media, encode_media};
use chatrelay_engine::traits::HttpTransport;
use chatrelay_providers::request::HttpRequest;
use chatrelay_providers::runtime::{HttpError, HttpResponse};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

pub const CACHE_VERSION: &str = "chatrelay-shell-v1";
pub const OFFLINE_SHELL_PATH: &str = "/index.html";
pub const DEFAULT_CDN_HOSTS: [&str; 1] = ["cdnjs.cloudflare.com"];

pub const DEFAULT_MANIFEST: [&str; 5] = [
    "/",
    "/index.html",
    "/css/styles.css",
    "/scripts/main.js",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl From<&HttpResponse> for CachedResponse {
    fn from(r: &HttpResponse) -> Self {
        Self {
            status: r.status,
            content_type: r.content_type.clone(),
            body: r.body.clone(),
        }
    }
}

impl From<CachedResponse> for HttpResponse {
    fn from(c: CachedResponse) -> Self {
        HttpResponse {
            status: c.status,
            content_type: c.content_type,
            body: c.body,
        }
    }
}

/// Storage for cache entries, partitioned by version tag.
pub trait CacheStore: Send + Sync {
    fn get(&self, version: &str, key: &str) -> anyhow::Result<Option<CachedResponse>>;
    fn put(&self, version: &str, key: &str, resp: &CachedResponse) -> anyhow::Result<()>;
    fn versions(&self) -> anyhow::Result<Vec<String>>;
    fn purge(&self, version: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryCacheStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, CachedResponse>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, version: &str, key: &str) -> anyhow::Result<Option<CachedResponse>> {
        Ok(self.lock().get(version).and_then(|v| v.get(key)).cloned())
    }

    fn put(&self, version: &str, key: &str, resp: &CachedResponse) -> anyhow::Result<()> {
        self.lock()
            .entry(version.to_string())
            .or_default()
            .insert(key.to_string(), resp.clone());
        Ok(())
    }

    fn versions(&self) -> anyhow::Result<Vec<String>> {
        let mut v: Vec<String> = self.lock().keys().cloned().collect();
        v.sort();
        Ok(v)
    }

    fn purge(&self, version: &str) -> anyhow::Result<()> {
        self.lock().remove(version);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    url: String,
    status: u16,
    content_type: Option<String>,
    body: String,
}

/// `<root>/<version>/<sha256(key)>.json`
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn at_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, version: &str, key: &str) -> PathBuf {
        let digest = sha2::Sha256::digest(key.as_bytes());
        self.root.join(version).join(format!("{digest:x}.json"))
    }
}

impl CacheStore for DiskCacheStore {
    fn get(&self, version: &str, key: &str) -> anyhow::Result<Option<CachedResponse>> {
        let path = self.entry_path(version, key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)
            .with_context(|| format!("read cache entry: {}", path.display()))?;
        let entry: DiskEntry = serde_json::from_slice(&raw)
            .with_context(|| format!("decode cache entry: {}", path.display()))?;
        let body = decode_media(&entry.body)
            .with_context(|| format!("decode cached body: {}", path.display()))?;
        Ok(Some(CachedResponse {
            status: entry.status,
            content_type: entry.content_type,
            body,
        }))
    }

    fn put(&self, version: &str, key: &str, resp: &CachedResponse) -> anyhow::Result<()> {
        let entry = DiskEntry {
            url: key.to_string(),
            status: resp.status,
            content_type: resp.content_type.clone(),
            body: encode_media(&resp.body),
        };
        let json = serde_json::to_vec(&entry).context("encode cache entry")?;
        crate::fsutil::write_atomic(&self.entry_path(version, key), &json)
    }

    fn versions(&self) -> anyhow::Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut out = vec![];
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("list cache root: {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    fn purge(&self, version: &str) -> anyhow::Result<()> {
        let dir = self.root.join(version);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("remove cache version: {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub url: Url,
    /// A full-page navigation; may be answered with the offline shell.
    pub navigate: bool,
}

impl CacheRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            navigate: false,
        }
    }

    pub fn navigate(url: Url) -> Self {
        Self {
            url,
            navigate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Not an intercepted origin; fetched without touching the cache.
    Passthrough,
    Network,
    Cache,
    OfflineShell,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub source: ResponseSource,
    pub response: HttpResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

pub struct OfflineCacheProxy {
    origin: Url,
    cdn_hosts: Vec<String>,
    version: String,
    manifest: Vec<String>,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn HttpTransport>,
}

impl OfflineCacheProxy {
    pub fn new(origin: Url, store: Arc<dyn CacheStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            origin,
            cdn_hosts: DEFAULT_CDN_HOSTS.iter().map(|h| h.to_string()).collect(),
            version: CACHE_VERSION.into(),
            manifest: DEFAULT_MANIFEST.iter().map(|u| u.to_string()).collect(),
            store,
            transport,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_cdn_hosts(mut self, hosts: Vec<String>) -> Self {
        self.cdn_hosts = hosts;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_intercepted(&self, url: &Url) -> bool {
        if url.origin() == self.origin.origin() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.cdn_hosts
            .iter()
            .any(|h| host == h || host.ends_with(&format!(".{h}")))
    }

    async fn fetch(&self, url: &Url) -> Result<HttpResponse, HttpError> {
        self.transport
            .execute(&HttpRequest::get(url.as_str()))
            .await
    }

    fn store_if_ok(&self, key: &str, resp: &HttpResponse) {
        if resp.status != 200 {
            return;
        }
        if let Err(e) = self.store.put(&self.version, key, &CachedResponse::from(resp)) {
            log::warn!("cache write failed for {key}: {e:#}");
        }
    }

    fn lookup(&self, key: &str) -> Option<CachedResponse> {
        match self.store.get(&self.version, key) {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("cache read failed for {key}: {e:#}");
                None
            }
        }
    }

    /// Fetch every manifest entry fresh and store it under the current version.
    pub async fn install(&self) -> InstallReport {
        let mut report = InstallReport::default();

        for entry in &self.manifest {
            let url = match self.origin.join(entry) {
                Ok(u) => u,
                Err(e) => {
                    log::error!("bad manifest entry {entry}: {e}");
                    report.failed.push(entry.clone());
                    continue;
                }
            };

            match self.fetch(&url).await {
                Ok(resp) if resp.status == 200 => {
                    self.store_if_ok(url.as_str(), &resp);
                    report.cached.push(url.to_string());
                }
                Ok(resp) => {
                    log::error!("failed to cache {url}: status {}", resp.status);
                    report.failed.push(url.to_string());
                }
                Err(e) => {
                    log::error!("failed to cache {url}: {e}");
                    report.failed.push(url.to_string());
                }
            }
        }

        log::info!(
            "cache {} installed: {} cached, {} failed",
            self.version,
            report.cached.len(),
            report.failed.len()
        );
        report
    }

    /// Purge every version other than the current one. Returns the purged tags.
    pub fn activate(&self) -> anyhow::Result<Vec<String>> {
        let mut purged = vec![];
        for v in self.store.versions()? {
            if v != self.version {
                log::info!("removing old cache {v}");
                self.store.purge(&v)?;
                purged.push(v);
            }
        }
        Ok(purged)
    }

    /// Network first; on failure the stored copy, then (navigations only) the offline shell.
    pub async fn handle(&self, req: &CacheRequest) -> Result<ProxyResponse, HttpError> {
        if !self.is_intercepted(&req.url) {
            let response = self.fetch(&req.url).await?;
            return Ok(ProxyResponse {
                source: ResponseSource::Passthrough,
                response,
            });
        }

        let key = req.url.as_str();
        let err = match self.fetch(&req.url).await {
            Ok(response) => {
                self.store_if_ok(key, &response);
                return Ok(ProxyResponse {
                    source: ResponseSource::Network,
                    response,
                });
            }
            Err(e) => e,
        };

        if let Some(hit) = self.lookup(key) {
            log::debug!("serving {key} from cache: {err}");
            return Ok(ProxyResponse {
                source: ResponseSource::Cache,
                response: hit.into(),
            });
        }

        if req.navigate {
            let shell = self
                .origin
                .join(OFFLINE_SHELL_PATH)
                .ok()
                .and_then(|u| self.lookup(u.as_str()));
            if let Some(shell) = shell {
                return Ok(ProxyResponse {
                    source: ResponseSource::OfflineShell,
                    response: shell.into(),
                });
            }
        }

        Err(err)
    }
}
