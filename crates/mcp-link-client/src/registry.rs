//! Adapter registry — one shared adapter per protocol.
//!
//! The registry is built once by the composition root and handed to whoever
//! needs it (`Arc<AdapterRegistry>`). It is read-only after construction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use mcp_link::{detect_protocol, Protocol};

use crate::adapter::Adapter;
use crate::types::{AdapterError, AdapterResult, CLIENT_NAME, CLIENT_VERSION};

/// TCP connect bound of the default HTTP client.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Counts reported by [`AdapterRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Number of registered adapters.
    pub total_adapters: usize,
    /// Registered protocol names.
    pub protocols: Vec<String>,
    /// How many registered adapters are currently connected.
    pub connected: usize,
}

/// Holds the shared adapters and the HTTP client used by new ones.
pub struct AdapterRegistry {
    adapters: BTreeMap<Protocol, Arc<Adapter>>,
    http: reqwest::Client,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Registry with one adapter per supported protocol.
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(format!("{CLIENT_NAME}/{CLIENT_VERSION}"))
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to the default HTTP client: {e}");
                reqwest::Client::new()
            });
        Self::with_http_client(http)
    }

    /// Registry whose HTTP and SSE adapters send through `http`.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        let adapters = Protocol::ALL
            .iter()
            .map(|&p| (p, Arc::new(Adapter::new(p, http.clone()))))
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(
            "Adapter registry ready: {}",
            adapters
                .keys()
                .map(Protocol::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self { adapters, http }
    }

    /// Shared adapter registered under `name`; `None` for unknown names.
    pub fn get_adapter(&self, name: &str) -> Option<Arc<Adapter>> {
        let protocol = name.parse::<Protocol>().ok()?;
        self.adapters.get(&protocol).cloned()
    }

    /// Shared adapter for `protocol`.
    pub fn get(&self, protocol: Protocol) -> Arc<Adapter> {
        match self.adapters.get(&protocol) {
            Some(adapter) => Arc::clone(adapter),
            // Every protocol is registered in `with_http_client`.
            None => Arc::new(self.create_adapter(protocol)),
        }
    }

    /// Names of the registered protocols.
    pub fn available_protocols(&self) -> BTreeSet<String> {
        self.adapters.keys().map(|p| p.as_str().to_string()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_adapters: self.adapters.len(),
            protocols: self.adapters.keys().map(|p| p.as_str().to_string()).collect(),
            connected: self.adapters.values().filter(|a| a.is_connected()).count(),
        }
    }

    /// Shared adapter for the protocol detected from `url`.
    pub fn auto_detect_adapter(&self, url: &str) -> AdapterResult<Arc<Adapter>> {
        let protocol = detect_protocol(url).map_err(AdapterError::UnsupportedUrl)?;
        tracing::debug!("Detected {protocol} for {url}");
        Ok(self.get(protocol))
    }

    /// A fresh adapter owned by the caller, sharing the HTTP client.
    pub fn create_adapter(&self, protocol: Protocol) -> Adapter {
        Adapter::new(protocol, self.http.clone())
    }

    /// Dispose every registered adapter.
    pub async fn shutdown(&self) {
        join_all(self.adapters.values().map(|a| a.dispose())).await;
        tracing::info!("Adapter registry shut down");
    }
}
