//! Configuration resolution for peerwire.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (explicit path, else `~/.config/peerwire/relay.json`)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Complete peerwire configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// WebSocket acceptance endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub ws_path: String,
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            ws_path: "/video/connections".to_string(),
            max_frame_bytes: 64 * 1024, // 64 KiB
        }
    }
}

/// Which pub/sub bus backs the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process bus, only pairs sessions on the same node.
    Memory,
    #[default]
    Nats,
}

impl std::str::FromStr for BusBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "nats" => Ok(Self::Nats),
            other => Err(Error::Config(format!("Unknown bus backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub nats_url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            nats_url: "nats://127.0.0.1:4222".to_string(),
        }
    }
}

/// Per-session tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Payloads buffered for the connection writer before the session is
    /// considered unable to keep up.
    pub write_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "peerwire_relay=info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("peerwire").join("relay.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `PEERWIRE_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = lookup("PEERWIRE_LISTEN") {
        config.server.listen = val
            .parse()
            .map_err(|e| Error::Config(format!("PEERWIRE_LISTEN={val}: {e}")))?;
    }
    if let Some(val) = lookup("PEERWIRE_WS_PATH") {
        config.server.ws_path = val;
    }
    if let Some(val) = lookup("PEERWIRE_BUS") {
        config.bus.backend = val.parse()?;
    }
    if let Some(val) = lookup("PEERWIRE_NATS_URL") {
        config.bus.nats_url = val;
    }
    if let Some(val) = lookup("PEERWIRE_WRITE_QUEUE") {
        config.session.write_queue_capacity = val
            .parse()
            .map_err(|e| Error::Config(format!("PEERWIRE_WRITE_QUEUE={val}: {e}")))?;
    }
    if let Some(val) = lookup("PEERWIRE_LOG_JSON") {
        config.log.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
    Ok(())
}

/// Reject values the relay cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    if !config.server.ws_path.starts_with('/') {
        return Err(Error::Config(format!(
            "server.ws_path must start with '/': {}",
            config.server.ws_path
        )));
    }
    if config.session.write_queue_capacity == 0 {
        return Err(Error::Config(
            "session.write_queue_capacity must be at least 1".to_string(),
        ));
    }
    if config.server.max_frame_bytes == 0 {
        return Err(Error::Config(
            "server.max_frame_bytes must be at least 1".to_string(),
        ));
    }
    Ok(())
}
