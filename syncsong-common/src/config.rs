//! Configuration loading and config file resolution
//!
//! Every value has a compiled default. A TOML file can override the
//! defaults, and the binaries layer command-line arguments and `SYNCSONG_*`
//! environment variables (via clap) on top of the file.
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line `--config`)
//! 2. `SYNCSONG_CONFIG` environment variable
//! 3. Platform config file (`~/.config/syncsong/config.toml`, then
//!    `/etc/syncsong/config.toml` on Linux)
//! 4. None: compiled defaults, with a warning

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SYNCSONG_CONFIG";

/// Whole config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Authority settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Upstream catalog search endpoint; search returns no results when unset
    pub catalog_url: Option<String>,
    /// Periodic SYNC_STATE rebroadcast interval, 0 disables it
    pub resync_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
            catalog_url: None,
            resync_interval_secs: 0,
        }
    }
}

/// Participant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base HTTP URL of the authority; the room channel URL is derived from it
    pub server_url: String,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: 10,
        }
    }
}

impl TomlConfig {
    /// Parse config text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Locate the config file following the resolution priority
///
/// An explicit path or env var path is returned even if it does not exist so
/// that the caller reports the mistake instead of silently using defaults.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    platform_config_file()
}

/// Load configuration, falling back to compiled defaults when no file exists
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(explicit) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!("Config file not found: {:?}", path)));
            }
            info!("Loading configuration from {}", path.display());
            TomlConfig::from_file(&path)
        }
        None => {
            warn!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get the platform config file path if one exists
fn platform_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("syncsong").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/syncsong/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.resync_interval_secs, 0);
        assert!(config.server.catalog_url.is_none());
        assert_eq!(config.client.max_reconnect_attempts, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            port = 9100
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
