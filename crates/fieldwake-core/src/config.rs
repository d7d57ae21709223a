//! Configuration resolution for Fieldwake.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (explicit path, else ~/.config/fieldwake/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (applied by the server binary, highest priority)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rendezvous::RendezvousConfig;

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Canonical location of the event log document.
    pub data_file: PathBuf,
    pub wait_timeout_secs: u64,
    pub max_waiters: usize,
    pub status_ttl_secs: u64,
    /// Interval of the background status cache sweep. 0 disables it.
    pub sweep_interval_secs: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_file: default_data_file(),
            wait_timeout_secs: 60,
            max_waiters: 10_000,
            status_ttl_secs: 30,
            sweep_interval_secs: 60,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub const fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }

    pub const fn rendezvous(&self) -> RendezvousConfig {
        RendezvousConfig {
            wait_timeout: self.wait_timeout(),
            max_waiters: self.max_waiters,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global file is only read if present.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path().filter(|p| p.exists()) {
            Some(global) => load_config_file(&global)?,
            None => ServerConfig::default(),
        },
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|p| p.join("fieldwake").join("settings.json"))
}

/// Default event log location, `~/.fieldwake/data.json`.
pub fn default_data_file() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from("data.json"),
        |home| home.join(".fieldwake").join("data.json"),
    )
}

fn load_config_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `FIELDWAKE_*` overrides. Unparsable values are ignored.
pub fn apply_env_overrides(config: &mut ServerConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(addr) = var("FIELDWAKE_LISTEN_ADDR").and_then(|v| v.parse().ok()) {
        config.listen_addr = addr;
    }
    if let Some(path) = var("FIELDWAKE_DATA_FILE") {
        config.data_file = PathBuf::from(path);
    }
    if let Some(n) = var("FIELDWAKE_WAIT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.wait_timeout_secs = n;
    }
    if let Some(n) = var("FIELDWAKE_MAX_WAITERS").and_then(|v| v.parse().ok()) {
        config.max_waiters = n;
    }
    if let Some(n) = var("FIELDWAKE_STATUS_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.status_ttl_secs = n;
    }
    if let Some(level) = var("FIELDWAKE_LOG_LEVEL") {
        config.log_level = level;
    }
    if let Some(json) = var("FIELDWAKE_LOG_JSON").and_then(|v| v.parse().ok()) {
        config.log_json = json;
    }
}
