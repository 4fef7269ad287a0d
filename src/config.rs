//! Configuration management for Noor
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The upstream credential is only ever read from the environment.

use crate::error::{NoorError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable holding the upstream provider credential
pub const API_KEY_ENV: &str = "NOOR_UPSTREAM_API_KEY";

/// Main configuration structure for Noor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy (server side) settings
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Stream client (device side) settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Logging output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Accepted messages per device per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Path of the SQLite quota database (defaults to the data directory)
    #[serde(default)]
    pub quota_db: Option<PathBuf>,

    /// Upstream language-model provider settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_daily_limit() -> u32 {
    20
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            daily_limit: default_daily_limit(),
            quota_db: None,
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Upstream provider configuration
///
/// `api_base` exists so tests and local mocks can point the proxy at a
/// different server.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the provider API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens the provider may generate per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Provider API version header value
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout for non-streaming calls and connection setup (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Provider credential; never read from or written to the config file
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
            timeout_seconds: default_timeout_seconds(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stream client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the proxy chat endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Daily limit mirrored locally for the pre-send check
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Remaining-message count at or below which the UI should warn
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: u32,

    /// Delay between tokens during the simulated reveal (milliseconds)
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,

    /// Attempt incremental body reads; `false` forces the fallback path
    #[serde(default = "default_incremental_reads")]
    pub incremental_reads: bool,

    /// Directory for the local quota mirror (defaults to the data directory)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787/v1/chat".to_string()
}

fn default_warn_threshold() -> u32 {
    3
}

fn default_reveal_interval_ms() -> u64 {
    30
}

fn default_incremental_reads() -> bool {
    true
}

fn default_connect_timeout_seconds() -> u64 {
    15
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            daily_limit: default_daily_limit(),
            warn_threshold: default_warn_threshold(),
            reveal_interval_ms: default_reveal_interval_ms(),
            incremental_reads: default_incremental_reads(),
            state_dir: None,
            connect_timeout_seconds: default_connect_timeout_seconds(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "noor=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Platform data directory for Noor state
pub fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "noor", "noor")
        .ok_or_else(|| NoorError::Config("Could not determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NoorError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| NoorError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(addr) = std::env::var("NOOR_BIND_ADDRESS") {
            self.proxy.bind_address = addr;
        }

        if let Ok(limit) = std::env::var("NOOR_DAILY_LIMIT") {
            match limit.parse::<u32>() {
                Ok(value) => {
                    self.proxy.daily_limit = value;
                    self.client.daily_limit = value;
                }
                Err(_) => tracing::warn!("Invalid NOOR_DAILY_LIMIT: {}", limit),
            }
        }

        if let Ok(db) = std::env::var("NOOR_QUOTA_DB") {
            self.proxy.quota_db = Some(PathBuf::from(db));
        }

        if let Ok(base) = std::env::var("NOOR_UPSTREAM_BASE") {
            self.proxy.upstream.api_base = base;
        }

        if let Ok(model) = std::env::var("NOOR_UPSTREAM_MODEL") {
            self.proxy.upstream.model = model;
        }

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.proxy.upstream.api_key = Some(key);
            }
        }

        if let Ok(endpoint) = std::env::var("NOOR_ENDPOINT") {
            self.client.endpoint = endpoint;
        }

        if let Ok(dir) = std::env::var("NOOR_STATE_DIR") {
            self.client.state_dir = Some(PathBuf::from(dir));
        }

        if let Ok(incremental) = std::env::var("NOOR_INCREMENTAL_READS") {
            match incremental.parse::<bool>() {
                Ok(v) => self.client.incremental_reads = v,
                Err(_) => tracing::warn!("Invalid NOOR_INCREMENTAL_READS: {}", incremental),
            }
        }

        if let Ok(json_logs) = std::env::var("NOOR_LOG_JSON") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json = v,
                Err(_) => tracing::warn!("Invalid NOOR_LOG_JSON: {}", json_logs),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "noor=debug,tower_http=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// A missing upstream credential is deliberately not a validation
    /// failure: the proxy starts and answers each chat request with a
    /// misconfiguration error instead.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.bind_address.parse::<SocketAddr>().is_err() {
            return Err(NoorError::Config(format!(
                "proxy.bind_address is not a socket address: {}",
                self.proxy.bind_address
            ))
            .into());
        }

        if self.proxy.daily_limit == 0 {
            return Err(
                NoorError::Config("proxy.daily_limit must be greater than 0".to_string()).into(),
            );
        }

        validate_http_url("proxy.upstream.api_base", &self.proxy.upstream.api_base)?;

        if self.proxy.upstream.model.trim().is_empty() {
            return Err(
                NoorError::Config("proxy.upstream.model cannot be empty".to_string()).into(),
            );
        }

        if self.proxy.upstream.max_tokens == 0 {
            return Err(NoorError::Config(
                "proxy.upstream.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.upstream.timeout_seconds == 0 {
            return Err(NoorError::Config(
                "proxy.upstream.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        validate_http_url("client.endpoint", &self.client.endpoint)?;

        if self.client.daily_limit == 0 {
            return Err(
                NoorError::Config("client.daily_limit must be greater than 0".to_string()).into(),
            );
        }

        if self.client.warn_threshold > self.client.daily_limit {
            return Err(NoorError::Config(
                "client.warn_threshold cannot exceed client.daily_limit".to_string(),
            )
            .into());
        }

        if self.client.reveal_interval_ms == 0 || self.client.reveal_interval_ms > 5_000 {
            return Err(NoorError::Config(
                "client.reveal_interval_ms must be between 1 and 5000".to_string(),
            )
            .into());
        }

        if self.client.connect_timeout_seconds == 0 {
            return Err(NoorError::Config(
                "client.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Resolved path of the proxy's quota database
    pub fn quota_db_path(&self) -> Result<PathBuf> {
        match &self.proxy.quota_db {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("quota.db")),
        }
    }

    /// Resolved directory of the client's local state
    pub fn client_state_dir(&self) -> Result<PathBuf> {
        match &self.client.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("client")),
        }
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| NoorError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(NoorError::Config(format!("{} must use http or https", field)).into());
    }
    Ok(())
}
