//! Negotiation strategy: which protocols to try, in which order, how long.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::protocol::Protocol;

/// Derived from a [`ServerConfig`] once per negotiation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationStrategy {
    /// Tried first.
    pub preferred_protocol: Protocol,
    /// Tried in order after the preferred protocol fails.
    pub fallback_protocols: Vec<Protocol>,
    /// Bound on each individual connect attempt.
    pub connection_timeout: Duration,
}

impl NegotiationStrategy {
    /// Build the strategy for `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            preferred_protocol: config.protocol,
            fallback_protocols: config.fallback_protocols.clone(),
            connection_timeout: config.connection_timeout(),
        }
    }

    /// Preferred protocol followed by the fallbacks, each at most once.
    pub fn candidates(&self) -> Vec<Protocol> {
        let mut out = vec![self.preferred_protocol];
        for p in &self.fallback_protocols {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }
}
