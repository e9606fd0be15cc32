//! Persisted description of one remote MCP endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::detect::detect_protocol;
use crate::error::{ConfigError, ConfigResult};
use crate::protocol::Protocol;

/// Connect timeout used when a config does not set one.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One remote MCP server.
///
/// Values are never mutated in place by the library: the `with_*` methods and
/// [`ServerConfig::for_protocol`] return modified copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ServerConfigRepr")]
pub struct ServerConfig {
    /// Unique identifier.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Endpoint URL; its scheme must match `protocol`.
    pub url: String,
    /// Declared (preferred) protocol.
    pub protocol: Protocol,
    /// Disabled servers are never negotiated.
    pub enabled: bool,
    /// Connect timeout in whole seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Whether the host should reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Ordered fallbacks. Empty means no fallback.
    pub fallback_protocols: Vec<Protocol>,
}

/// Wire shape accepted on input: optional protocol and fallbacks.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerConfigRepr {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    protocol: Option<Protocol>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    auto_reconnect: bool,
    #[serde(default)]
    fallback_protocols: Option<Vec<Protocol>>,
}

fn default_true() -> bool {
    true
}

impl TryFrom<ServerConfigRepr> for ServerConfig {
    type Error = ConfigError;

    fn try_from(repr: ServerConfigRepr) -> Result<Self, Self::Error> {
        // A missing protocol is inferred from the URL.
        let protocol = match repr.protocol {
            Some(p) => p,
            None => detect_protocol(&repr.url)?,
        };
        let fallback_protocols = repr
            .fallback_protocols
            .unwrap_or_else(|| protocol.default_fallbacks());

        Ok(Self {
            id: repr.id,
            name: repr.name,
            url: repr.url,
            protocol,
            enabled: repr.enabled,
            timeout: repr.timeout,
            auto_reconnect: repr.auto_reconnect,
            fallback_protocols,
        })
    }
}

impl ServerConfig {
    /// Create an enabled config with the default fallback order.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            protocol,
            enabled: true,
            timeout: None,
            auto_reconnect: false,
            fallback_protocols: protocol.default_fallbacks(),
        }
    }

    /// Build an ad-hoc config for a bare URL, detecting its protocol.
    pub fn from_url(url: &str) -> ConfigResult<Self> {
        let protocol = detect_protocol(url)?;
        let name = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Ok(Self::new(
            uuid::Uuid::new_v4().to_string(),
            name,
            url,
            protocol,
        ))
    }

    /// Copy with a different declared protocol. Fallbacks are kept.
    pub fn with_protocol(&self, protocol: Protocol) -> Self {
        Self {
            protocol,
            ..self.clone()
        }
    }

    /// Copy with a connect timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout.as_secs().max(1)),
            ..self.clone()
        }
    }

    /// Copy with an explicit fallback list.
    pub fn with_fallbacks(&self, fallbacks: Vec<Protocol>) -> Self {
        Self {
            fallback_protocols: fallbacks,
            ..self.clone()
        }
    }

    /// Copy with the enabled flag set.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    /// Effective connect timeout. Zero counts as unset.
    pub fn connection_timeout(&self) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Validate against `protocol`, returning the parsed URL.
    pub fn check_for(&self, protocol: Protocol) -> ConfigResult<Url> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingField("id"));
        }
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingField("url"));
        }

        let url = Url::parse(raw).map_err(|e| ConfigError::MalformedUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !protocol.accepts_scheme(url.scheme()) {
            return Err(ConfigError::SchemeMismatch {
                scheme: url.scheme().to_string(),
                protocol: protocol.to_string(),
                expected: protocol.expected_schemes().join(", "),
            });
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::MalformedUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(url)
    }

    /// Validate against the declared protocol.
    pub fn check(&self) -> ConfigResult<Url> {
        self.check_for(self.protocol)
    }

    /// Predicate form of [`ServerConfig::check_for`].
    pub fn is_valid_for(&self, protocol: Protocol) -> bool {
        match self.check_for(protocol) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Config '{}' rejected for {protocol}: {e}", self.id);
                false
            }
        }
    }

    /// Copy that targets `protocol`, translating the URL scheme between the
    /// WebSocket and HTTP families (`ws`<->`http`, `wss`<->`https`).
    ///
    /// Unparseable URLs are copied unchanged so validation can report them.
    pub fn for_protocol(&self, protocol: Protocol) -> Self {
        let mut next = self.with_protocol(protocol);

        let Ok(mut url) = Url::parse(self.url.trim()) else {
            return next;
        };
        if protocol.accepts_scheme(url.scheme()) {
            return next;
        }

        let target = match (url.scheme(), protocol) {
            ("http", Protocol::WebSocket) => "ws",
            ("https", Protocol::WebSocket) => "wss",
            ("ws", Protocol::Http | Protocol::Sse) => "http",
            ("wss", Protocol::Http | Protocol::Sse) => "https",
            _ => return next,
        };

        if url.set_scheme(target).is_ok() {
            next.url = url.to_string();
        } else {
            log::warn!("Could not map {} to {protocol}", self.url);
        }
        next
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
