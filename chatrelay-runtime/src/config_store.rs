use anyhow::Context;
use chatrelay_core::config::WidgetConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<WidgetConfig> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read config: {}", self.path.display()))?;
        let cfg: WidgetConfig = serde_json::from_slice(&bytes).context("decode config JSON")?;
        Ok(cfg)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(&self) -> anyhow::Result<WidgetConfig> {
        if !self.path.exists() {
            return Ok(WidgetConfig::default());
        }
        self.load()
    }

    pub fn save(&self, cfg: &WidgetConfig) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(cfg).context("encode config JSON")?;
        crate::fsutil::write_atomic(&self.path, &json)
            .with_context(|| format!("save config: {}", self.path.display()))
    }
}
