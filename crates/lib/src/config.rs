//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.tether/config.json`) and environment.
//! Kept minimal: the bridge exposes a single port plus the approval timeout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bridge server settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Bridge bind, port, and approval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// TCP port (default 9876). 0 lets the OS pick a free port.
    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). The server refuses non-loopback binds.
    #[serde(default = "default_bridge_bind")]
    pub bind: String,

    /// Seconds to wait for the operator's verdict on a new connection before
    /// treating it as rejected (default 30).
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
}

fn default_bridge_port() -> u16 {
    9876
}

fn default_bridge_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_approval_timeout_secs() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_bridge_port(),
            bind: default_bridge_bind(),
            approval_timeout_secs: default_approval_timeout_secs(),
        }
    }
}

/// Resolve the bridge port: TETHER_PORT env overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    std::env::var("TETHER_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(config.bridge.port)
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TETHER_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".tether").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or TETHER_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Path of the port file a standalone bridge writes on start (`port` next to the config file).
/// Clients read it to auto-detect a running bridge.
pub fn port_file_path() -> PathBuf {
    default_config_path()
        .parent()
        .map(|p| p.join("port"))
        .unwrap_or_else(|| PathBuf::from("port"))
}

/// Write the bound port to the port file so clients can auto-detect it.
pub fn write_port_file(port: u16) -> std::io::Result<PathBuf> {
    let path = port_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, format!("{}\n", port))?;
    Ok(path)
}

/// Read the port file if present and valid.
pub fn read_port_file() -> Option<u16> {
    let s = std::fs::read_to_string(port_file_path()).ok()?;
    s.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bridge_port_and_bind() {
        let b = BridgeConfig::default();
        assert_eq!(b.port, 9876);
        assert_eq!(b.bind, "127.0.0.1");
        assert_eq!(b.approval_timeout_secs, 30);
    }

    #[test]
    fn loopback_binds() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(is_loopback_bind("::1"));
        assert!(!is_loopback_bind("0.0.0.0"));
        assert!(!is_loopback_bind("192.168.1.4"));
    }

    #[test]
    fn config_parses_partial_json() {
        let config: Config = serde_json::from_str(r#"{"bridge":{"port":4242}}"#).expect("parse");
        assert_eq!(config.bridge.port, 4242);
        assert_eq!(config.bridge.bind, "127.0.0.1");
        assert_eq!(config.bridge.approval_timeout_secs, 30);
    }
}
