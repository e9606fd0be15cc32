//! Protocol negotiation — try the preferred transport, then each fallback.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mcp_link::{Feature, HealthStatus, NegotiationStrategy, Protocol, ServerConfig};

use crate::adapter::Adapter;
use crate::registry::AdapterRegistry;
use crate::types::{AdapterError, AdapterResult, FailedAttempt, ServerCapabilities};

/// Where a negotiation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing tried yet.
    Idle,
    /// Trying `protocol`; `attempt` counts from 1.
    Negotiating { protocol: Protocol, attempt: usize },
    /// Settled on `protocol`.
    Connected(Protocol),
    /// Every candidate failed.
    Exhausted,
}

/// Bookkeeping for one run over a strategy's candidates.
#[derive(Debug, Clone)]
pub struct Negotiation {
    server_id: String,
    candidates: Vec<Protocol>,
    next: usize,
    state: NegotiationState,
    attempts: Vec<FailedAttempt>,
}

impl Negotiation {
    pub fn new(server_id: impl Into<String>, strategy: &NegotiationStrategy) -> Self {
        Self {
            server_id: server_id.into(),
            candidates: strategy.candidates(),
            next: 0,
            state: NegotiationState::Idle,
            attempts: Vec::new(),
        }
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Failures recorded so far, in order.
    pub fn attempts(&self) -> &[FailedAttempt] {
        &self.attempts
    }

    /// Move to the next candidate, or to `Exhausted` when none is left.
    pub fn next_candidate(&mut self) -> Option<Protocol> {
        if matches!(
            self.state,
            NegotiationState::Connected(_) | NegotiationState::Exhausted
        ) {
            return None;
        }
        match self.candidates.get(self.next).copied() {
            Some(protocol) => {
                self.next += 1;
                self.state = NegotiationState::Negotiating {
                    protocol,
                    attempt: self.next,
                };
                tracing::debug!(
                    "Negotiating '{}': trying {protocol} ({}/{})",
                    self.server_id,
                    self.next,
                    self.candidates.len()
                );
                Some(protocol)
            }
            None => {
                self.state = NegotiationState::Exhausted;
                tracing::debug!("Negotiating '{}': no candidates left", self.server_id);
                None
            }
        }
    }

    pub fn record_failure(&mut self, protocol: Protocol, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            "Negotiating '{}': {protocol} failed: {reason}",
            self.server_id
        );
        self.attempts.push(FailedAttempt { protocol, reason });
    }

    pub fn record_success(&mut self, protocol: Protocol) {
        self.state = NegotiationState::Connected(protocol);
        tracing::info!("Negotiated {protocol} for '{}'", self.server_id);
    }

    /// The terminal error once every candidate has failed.
    pub fn into_error(self) -> AdapterError {
        AdapterError::NegotiationExhausted {
            server_id: self.server_id,
            attempts: self.attempts,
        }
    }
}

/// A connected adapter and how it was reached.
#[derive(Debug)]
pub struct Negotiated {
    /// Caller-owned, connected adapter.
    pub adapter: Adapter,
    /// Protocol that succeeded.
    pub protocol: Protocol,
    /// Candidates that failed before it, in order.
    pub attempts: Vec<FailedAttempt>,
}

/// Outcome of [`ProtocolNegotiator::test_connection`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub server_id: String,
    pub success: bool,
    /// Protocol that connected, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    /// Transport features of the connected protocol.
    pub features: BTreeSet<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_capabilities: Option<ServerCapabilities>,
    pub failed_attempts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tested_at: DateTime<Utc>,
}

/// Connects to servers by walking a [`NegotiationStrategy`].
pub struct ProtocolNegotiator {
    registry: Arc<AdapterRegistry>,
}

impl ProtocolNegotiator {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn create_strategy(&self, config: &ServerConfig) -> NegotiationStrategy {
        NegotiationStrategy::from_config(config)
    }

    /// Connect to `config` over the first protocol that works.
    ///
    /// Candidates are tried one at a time, each with a fresh adapter, and no
    /// candidate is retried.
    pub async fn negotiate(&self, config: &ServerConfig) -> AdapterResult<Negotiated> {
        if !config.enabled {
            return Err(AdapterError::ServerDisabled(config.id.clone()));
        }

        let strategy = self.create_strategy(config);
        let mut negotiation = Negotiation::new(&config.id, &strategy);

        while let Some(protocol) = negotiation.next_candidate() {
            let candidate = config
                .for_protocol(protocol)
                .with_timeout(strategy.connection_timeout);
            let adapter = self.registry.create_adapter(protocol);

            if !adapter.validate_config(&candidate) {
                let reason = match candidate.check_for(protocol) {
                    Err(e) => e.to_string(),
                    Ok(_) => "config rejected".to_string(),
                };
                negotiation.record_failure(protocol, reason);
                continue;
            }

            match adapter.connect(&candidate).await {
                Ok(()) => {
                    negotiation.record_success(protocol);
                    return Ok(Negotiated {
                        adapter,
                        protocol,
                        attempts: negotiation.attempts().to_vec(),
                    });
                }
                Err(e) if e.is_connection_failure() => {
                    negotiation.record_failure(protocol, e.to_string());
                    adapter.dispose().await;
                }
                Err(e) => {
                    // Not a transport problem; another protocol will not help.
                    adapter.dispose().await;
                    return Err(e);
                }
            }
        }

        Err(negotiation.into_error())
    }

    /// Negotiate with an ad-hoc config built from `url`.
    pub async fn negotiate_url(&self, url: &str) -> AdapterResult<Negotiated> {
        let config = ServerConfig::from_url(url).map_err(AdapterError::UnsupportedUrl)?;
        self.negotiate(&config).await
    }

    /// Negotiate, ping and disconnect, capturing what happened. Never fails.
    pub async fn test_connection(&self, config: &ServerConfig) -> ConnectionReport {
        let mut report = ConnectionReport {
            server_id: config.id.clone(),
            success: false,
            protocol: None,
            latency_ms: None,
            health: None,
            features: BTreeSet::new(),
            server_capabilities: None,
            failed_attempts: Vec::new(),
            error: None,
            tested_at: Utc::now(),
        };

        let negotiated = match self.negotiate(config).await {
            Ok(n) => n,
            Err(e) => {
                if let AdapterError::NegotiationExhausted { attempts, .. } = &e {
                    report.failed_attempts = attempts.iter().map(ToString::to_string).collect();
                }
                report.error = Some(e.to_string());
                return report;
            }
        };

        let adapter = negotiated.adapter;
        report.protocol = Some(negotiated.protocol);
        report.features = adapter.supported_features();
        report.failed_attempts = negotiated
            .attempts
            .iter()
            .map(ToString::to_string)
            .collect();
        report.server_capabilities = adapter.server_info().await.map(|i| i.capabilities);

        match adapter.ping().await {
            Ok(latency) => {
                report.success = true;
                report.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
            }
            Err(e) => report.error = Some(format!("ping failed: {e}")),
        }
        report.health = Some(adapter.health_status().await);

        adapter.dispose().await;
        report
    }
}
