//! Configuration loading and resolution
//!
//! Bootstrap configuration comes from a TOML file located with this priority:
//! 1. Command-line argument (highest priority)
//! 2. `CHANTRACK_CONFIG` environment variable
//! 3. `<config_dir>/chantrack/config.toml`
//! 4. Built-in defaults (a missing file is a warning, not an error)
//!
//! Individual environment overrides (`CHANTRACK_BACKEND_URL`,
//! `CHANTRACK_FORCE_PRODUCTION`, `CHANTRACK_PORT`) are applied on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{Error, Result};

pub const ENV_CONFIG_PATH: &str = "CHANTRACK_CONFIG";
pub const ENV_BACKEND_URL: &str = "CHANTRACK_BACKEND_URL";
pub const ENV_FORCE_PRODUCTION: &str = "CHANTRACK_FORCE_PRODUCTION";
pub const ENV_PORT: &str = "CHANTRACK_PORT";

/// Bootstrap configuration loaded from TOML
///
/// Cannot change while the service runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,
    pub backend: BackendConfig,
    pub retry: RetryConfig,
    /// Channel dashboard scheduling
    pub channels: ScheduleConfig,
    /// Teams dashboard scheduling
    pub teams: ScheduleConfig,
    pub members: MemberConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 5790,
            backend: BackendConfig::default(),
            retry: RetryConfig::default(),
            channels: ScheduleConfig::default(),
            teams: ScheduleConfig {
                policy: PolicyKind::Pool,
                ..ScheduleConfig::default()
            },
            members: MemberConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Backend API endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend API
    pub base_url: String,
    /// Production backend, used instead of `base_url` when `force_production` is set
    pub production_url: Option<String>,
    pub force_production: bool,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            production_url: None,
            force_production: false,
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl BackendConfig {
    /// Base URL after applying the force-production switch
    pub fn effective_base_url(&self) -> &str {
        match (&self.production_url, self.force_production) {
            (Some(url), true) => url.as_str(),
            (None, true) => {
                warn!("force_production set but no production_url configured, using base_url");
                self.base_url.as_str()
            }
            _ => self.base_url.as_str(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// HTTP 429 retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Wait used when `Retry-After` is missing or invalid
    pub default_retry_after_secs: u64,
    /// Upper bound on any single `Retry-After` wait
    pub max_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            default_retry_after_secs: 1,
            max_retry_after_secs: 60,
        }
    }
}

/// Scheduling policy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Fixed-size waves with a pause between waves
    Chunked,
    /// Bounded number of entities in flight
    Pool,
}

/// Enrichment scheduling for one dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub policy: PolicyKind,
    /// Entities per wave (chunked policy)
    pub chunk_size: usize,
    /// Pause between waves in milliseconds (chunked policy)
    pub pause_ms: u64,
    /// Entities in flight (pool policy)
    pub max_active: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Chunked,
            chunk_size: 20,
            pause_ms: 1000,
            max_active: 5,
        }
    }
}

/// Member resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberConfig {
    /// Email domain identifying internal members
    pub internal_domain: String,
    /// Identity lookups allowed per second
    pub lookups_per_second: u32,
}

impl Default for MemberConfig {
    fn default() -> Self {
        Self {
            internal_domain: "adobe.com".to_string(),
            lookups_per_second: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "chantrack_tracker=info,chantrack_common=info,tower_http=info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Reject values the scheduler or fetch client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        for (name, schedule) in [("channels", &self.channels), ("teams", &self.teams)] {
            if schedule.chunk_size == 0 {
                return Err(Error::Config(format!("{}.chunk_size must be at least 1", name)));
            }
            if schedule.max_active == 0 {
                return Err(Error::Config(format!("{}.max_active must be at least 1", name)));
            }
        }
        if self.members.lookups_per_second == 0 {
            return Err(Error::Config(
                "members.lookups_per_second must be at least 1".to_string(),
            ));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(Error::Config("backend.base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            if !url.trim().is_empty() {
                info!("Backend URL overridden by {}", ENV_BACKEND_URL);
                self.backend.base_url = url;
            }
        }

        if let Ok(flag) = std::env::var(ENV_FORCE_PRODUCTION) {
            self.backend.force_production = parse_bool(&flag).ok_or_else(|| {
                Error::Config(format!("{} must be true or false, got '{}'", ENV_FORCE_PRODUCTION, flag))
            })?;
        }

        if let Ok(port) = std::env::var(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{} is not a valid port: {}", ENV_PORT, e)))?;
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Platform default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chantrack").join("config.toml"))
}

/// Locates and loads the bootstrap configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Path of the configuration file to use, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path()
    }

    /// Resolve the effective configuration
    ///
    /// An explicitly requested file (CLI or environment) must exist and parse.
    /// A missing platform default file falls back to built-in defaults.
    pub fn resolve(&self) -> Result<TomlConfig> {
        let explicit = self.cli_path.is_some()
            || std::env::var(ENV_CONFIG_PATH).is_ok_and(|p| !p.trim().is_empty());

        let mut config = match self.config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                load_toml_config(&path)?
            }
            Some(path) if explicit => {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                warn!(
                    "No configuration file at {}, using built-in defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}
