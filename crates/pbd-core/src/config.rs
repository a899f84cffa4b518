use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `[proxy].username`.
pub const ENV_PROXY_USERNAME: &str = "PBD_PROXY_USERNAME";
/// Environment variable that overrides `[proxy].password`.
pub const ENV_PROXY_PASSWORD: &str = "PBD_PROXY_PASSWORD";

/// Configuration problems that must stop the run before the scheduler starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("proxy username is not set (config [proxy].username or PBD_PROXY_USERNAME)")]
    MissingUsername,
    #[error("proxy password is not set (config [proxy].password or PBD_PROXY_PASSWORD)")]
    MissingPassword,
    #[error("proxy country must be a two-letter code, got {0:?}")]
    InvalidCountry(String),
    #[error("concurrency bounds invalid: min={min} max={max} (need 1 <= min <= max)")]
    ConcurrencyBounds { min: usize, max: usize },
    #[error("initial concurrency {initial} is outside [{min}, {max}]")]
    InitialConcurrency { initial: usize, min: usize, max: usize },
    #[error("watermarks must satisfy 0 <= low < high <= 1 (low={low}, high={high})")]
    Watermarks { low: f64, high: f64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("min_success_ratio must be within [0, 1], got {0}")]
    SuccessRatio(f64),
    #[error("cannot read URL list {}: {source}", .path.display())]
    InputList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Upstream proxy endpoint and credential template (`[proxy]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Base username; the session suffix is appended per attempt.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Optional two-letter egress country (e.g. "us").
    pub country: Option<String>,
    /// Optional proxy zone name.
    pub zone: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "brd.superproxy.io".to_string(),
            port: 33335,
            username: None,
            password: None,
            country: None,
            zone: None,
        }
    }
}

/// Adaptive concurrency parameters (`[concurrency]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub min: usize,
    pub max: usize,
    /// Starting slot count; `min` when unset.
    pub initial: Option<usize>,
    /// Slots added or removed per transition.
    pub step: usize,
    /// Number of recent outcomes the success rate is computed over.
    pub window_size: usize,
    pub low_watermark: f64,
    pub high_watermark: f64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 20,
            initial: None,
            step: 2,
            window_size: 20,
            low_watermark: 0.5,
            high_watermark: 0.9,
        }
    }
}

impl ConcurrencyConfig {
    pub fn initial_slots(&self) -> usize {
        self.initial.unwrap_or(self.min)
    }
}

/// Retry policy parameters (`[retry]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

/// HTTP fetch parameters (`[fetch]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Deadline for one attempt, covering every request the attempt makes.
    pub timeout_secs: u64,
    /// Payloads smaller than this are treated as truncated or bogus.
    pub min_payload_bytes: u64,
    /// Accepted `Content-Type` prefixes; empty accepts anything.
    pub accepted_content_types: Vec<String>,
    /// Fetch the page first and download the media address embedded in it.
    pub resolve_embedded: bool,
    /// Endpoint used by the preflight connectivity check.
    pub check_url: String,
    /// Skip TLS certificate verification (some proxy zones re-sign traffic).
    pub insecure_tls: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 45,
            min_payload_bytes: 10_000,
            accepted_content_types: vec![
                "video/".to_string(),
                "audio/".to_string(),
                "image/".to_string(),
                "application/octet-stream".to_string(),
                "binary/octet-stream".to_string(),
            ],
            resolve_embedded: false,
            check_url: "https://geo.brdtest.com/mygeo.json".to_string(),
            insecure_tls: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Global configuration loaded from `~/.config/pbd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PbdConfig {
    /// Directory downloaded payloads are written to.
    pub output_dir: PathBuf,
    /// Fraction of items that must succeed for the run to exit 0.
    pub min_success_ratio: f64,
    pub proxy: ProxyConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub fetch: FetchConfig,
}

impl Default for PbdConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            min_success_ratio: 0.5,
            proxy: ProxyConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl PbdConfig {
    /// Apply credential overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply credential overrides from `lookup` (non-empty values win over the file).
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(ENV_PROXY_USERNAME).filter(|v| !v.is_empty()) {
            self.proxy.username = Some(user);
        }
        if let Some(pass) = lookup(ENV_PROXY_PASSWORD).filter(|v| !v.is_empty()) {
            self.proxy.password = Some(pass);
        }
    }

    /// Check everything the scheduler relies on. The core is never entered with a config
    /// that fails here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.username.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingUsername);
        }
        if self.proxy.password.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingPassword);
        }
        if let Some(cc) = &self.proxy.country {
            if cc.len() != 2 || !cc.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::InvalidCountry(cc.clone()));
            }
        }

        let c = &self.concurrency;
        if c.min == 0 || c.min > c.max {
            return Err(ConfigError::ConcurrencyBounds {
                min: c.min,
                max: c.max,
            });
        }
        let initial = c.initial_slots();
        if initial < c.min || initial > c.max {
            return Err(ConfigError::InitialConcurrency {
                initial,
                min: c.min,
                max: c.max,
            });
        }
        if c.step == 0 {
            return Err(ConfigError::Zero("concurrency.step"));
        }
        if c.window_size == 0 {
            return Err(ConfigError::Zero("concurrency.window_size"));
        }
        if !(0.0..=1.0).contains(&c.low_watermark)
            || !(0.0..=1.0).contains(&c.high_watermark)
            || c.low_watermark >= c.high_watermark
        {
            return Err(ConfigError::Watermarks {
                low: c.low_watermark,
                high: c.high_watermark,
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Zero("retry.max_attempts"));
        }
        if !(self.retry.base_delay_secs > 0.0) {
            return Err(ConfigError::Zero("retry.base_delay_secs"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Zero("fetch.timeout_secs"));
        }
        if !(0.0..=1.0).contains(&self.min_success_ratio) {
            return Err(ConfigError::SuccessRatio(self.min_success_ratio));
        }
        Ok(())
    }

    /// Copy with the proxy password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if out.proxy.password.is_some() {
            out.proxy.password = Some("***".to_string());
        }
        out
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pbd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PbdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PbdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file. Missing sections and fields use defaults.
pub fn load_from_path(path: &Path) -> Result<PbdConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: PbdConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
