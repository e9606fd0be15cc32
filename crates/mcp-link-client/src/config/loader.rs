//! Client config file: log level, default timeout and the server list.
//!
//! TOML (`*.toml`) and JSON (`*.json`) are both accepted; the extension
//! decides. Servers without their own timeout inherit `default_timeout`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mcp_link::ServerConfig;

use crate::types::{AdapterError, AdapterResult};

/// Environment variable naming the config file.
pub const DEFAULT_CONFIG_ENV: &str = "MCP_LINK_CONFIG";

const CONFIG_DIR: &str = "mcp-link";
const CONFIG_FILE: &str = "servers.toml";

/// Contents of the client config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Connect timeout in seconds for servers that do not set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<u64>,
    /// Known servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_timeout: None,
            servers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Server with the given id.
    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Servers with `enabled = true`, in file order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }

    fn apply_defaults(&mut self) {
        let Some(secs) = self.default_timeout.filter(|&s| s > 0) else {
            return;
        };
        for server in self.servers.iter_mut().filter(|s| s.timeout.is_none()) {
            server.timeout = Some(secs);
        }
    }

    fn check_unique_ids(&self) -> AdapterResult<()> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(AdapterError::ConfigFile(format!(
                    "duplicate server id '{}'",
                    server.id
                )));
            }
        }
        Ok(())
    }
}

enum Format {
    Toml,
    Json,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
        _ => Format::Toml,
    }
}

/// Pick the config file: explicit path, then `MCP_LINK_CONFIG`, then
/// `<config dir>/mcp-link/servers.toml`.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(DEFAULT_CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Load the config at `path`. A missing file yields the default config.
pub fn load_config(path: &Path) -> AdapterResult<ClientConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(ClientConfig::default());
    }

    let raw = std::fs::read_to_string(path)?;
    let mut config: ClientConfig = match format_of(path) {
        Format::Json => serde_json::from_str(&raw)
            .map_err(|e| AdapterError::ConfigFile(format!("{}: {e}", path.display())))?,
        Format::Toml => toml::from_str(&raw)
            .map_err(|e| AdapterError::ConfigFile(format!("{}: {e}", path.display())))?,
    };
    config.check_unique_ids()?;
    config.apply_defaults();

    tracing::info!(
        "Loaded {} server(s) from {}",
        config.servers.len(),
        path.display()
    );
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &ClientConfig) -> AdapterResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = match format_of(path) {
        Format::Json => serde_json::to_string_pretty(config)?,
        Format::Toml => {
            toml::to_string_pretty(config).map_err(|e| AdapterError::ConfigFile(e.to_string()))?
        }
    };
    std::fs::write(path, body)?;
    tracing::debug!("Saved config to {}", path.display());
    Ok(())
}
