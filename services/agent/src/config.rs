//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults. The only
//! secret material (the token store key) is generated at runtime and never
//! appears in the TOML; `CIVICA_API_URL` can override the configured base
//! URL for staging setups.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_client_kind")]
    pub client_kind: String,
}

/// Where the stores live
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Loopback listener settings
#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Periodic refresh policy
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_flex_hours")]
    pub flex_hours: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Start the periodic schedule on boot
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            flex_hours: default_flex_hours(),
            backoff_base_secs: default_backoff_base_secs(),
            max_retries: default_max_retries(),
            auto_start: default_auto_start(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    pub fn flex(&self) -> Duration {
        Duration::from_secs(self.flex_hours * 3600)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_client_kind() -> String {
    civica_auth::routes::DEFAULT_CLIENT_KIND.into()
}

fn default_max_connections() -> usize {
    64
}

fn default_interval_hours() -> u64 {
    civica_sync::DEFAULT_INTERVAL.as_secs() / 3600
}

fn default_flex_hours() -> u64 {
    civica_sync::DEFAULT_FLEX.as_secs() / 3600
}

fn default_backoff_base_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_auto_start() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("CIVICA_API_URL")
            && !url.trim().is_empty()
        {
            config.api.base_url = url.trim().to_owned();
        }

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api.base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.agent.max_connections == 0 {
            return Err(common::Error::Config(
                "agent.max_connections must be greater than 0".into(),
            ));
        }

        if config.refresh.interval_hours == 0 {
            return Err(common::Error::Config(
                "refresh.interval_hours must be greater than 0".into(),
            ));
        }

        if config.refresh.flex_hours > config.refresh.interval_hours {
            return Err(common::Error::Config(
                "refresh.flex_hours must not exceed refresh.interval_hours".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("civica-agent.toml")
    }
}
