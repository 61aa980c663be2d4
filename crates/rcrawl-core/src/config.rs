use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a run before it starts.
///
/// Everything else (bad seeds, transport failures, callback failures) is
/// isolated per request and never unwinds the dispatch loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("job name must not be empty")]
    MissingName,
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Engine tuning knobs loaded from `~/.config/rcrawl/config.toml`.
///
/// Per-run wiring (job name, base URI, seeds, callbacks, store, transport)
/// goes through `engine::CrawlerBuilder` instead; this struct only carries
/// the values that make sense as file-level defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    /// Resume an interrupted run from persisted state instead of reseeding.
    pub resume: bool,
    /// Per-request timeout in seconds (enforced by the transport).
    pub timeout_secs: f64,
    /// Emit a progress log line every `log_step` successful fetches (0 = never).
    pub log_step: u64,
    /// Politeness delay in seconds applied after each resolved request.
    pub interval_secs: f64,
    /// Expected seed count, used only for seeding progress log lines.
    #[serde(default)]
    pub queue_len: Option<u64>,
    /// Number of retries after the first failed attempt before a request
    /// is escalated to a permanent failure.
    pub max_retries: u32,
    /// Consult the blacklist hook when seeding and adding requests.
    pub check_blacklist: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            resume: false,
            timeout_secs: 10.0,
            log_step: 50,
            interval_secs: 0.0,
            queue_len: None,
            max_retries: 5,
            check_blacklist: true,
        }
    }
}

impl CrawlConfig {
    /// Per-request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    /// Politeness delay as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(0.0))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rcrawl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CrawlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CrawlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: CrawlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
