//! Authority runtime settings
//!
//! Command-line/environment values win over the config file, which wins
//! over compiled defaults.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use syncsong_common::config::TomlConfig;

use crate::error::{Error, Result};

/// Values given on the command line (or via `SYNCSONG_*` variables)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub catalog_url: Option<String>,
    pub resync_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen: SocketAddr,
    pub catalog_url: Option<String>,
    /// `None` disables periodic SYNC_STATE rebroadcast
    pub resync_interval: Option<Duration>,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(file: &TomlConfig, overrides: Overrides) -> Result<Self> {
        let bind_addr = overrides
            .bind_addr
            .unwrap_or_else(|| file.server.bind_addr.clone());
        let ip: IpAddr = bind_addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", bind_addr, e)))?;
        let port = overrides.port.unwrap_or(file.server.port);

        let catalog_url = overrides
            .catalog_url
            .or_else(|| file.server.catalog_url.clone())
            .filter(|url| !url.trim().is_empty());

        let resync_secs = overrides
            .resync_interval_secs
            .unwrap_or(file.server.resync_interval_secs);

        Ok(Self {
            listen: SocketAddr::new(ip, port),
            catalog_url,
            resync_interval: (resync_secs > 0).then(|| Duration::from_secs(resync_secs)),
            log_level: file.logging.level.clone(),
        })
    }
}
