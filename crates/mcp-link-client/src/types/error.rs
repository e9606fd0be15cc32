//! Adapter errors and JSON-RPC error codes.

use std::time::Duration;

use mcp_link::{ConfigError, Protocol};
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// One failed candidate during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// Protocol that was tried.
    pub protocol: Protocol,
    /// Why it failed.
    pub reason: String,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.protocol, self.reason)
    }
}

/// Errors raised by adapters, the registry and the negotiator.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The config is not valid for the adapter's protocol.
    #[error("Invalid server config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The URL could not be mapped to any adapter.
    #[error("Cannot detect adapter for URL: {0}")]
    UnsupportedUrl(ConfigError),

    /// The endpoint could not be reached or the transport could not be opened.
    #[error("{protocol} connection failed: {reason}")]
    ConnectionFailed { protocol: Protocol, reason: String },

    /// The connect attempt did not finish in time.
    #[error("{protocol} connection timed out after {after:?}")]
    Timeout { protocol: Protocol, after: Duration },

    /// The transport opened but the MCP initialize exchange failed.
    #[error("{protocol} handshake failed: {reason}")]
    Handshake { protocol: Protocol, reason: String },

    /// An operation that needs a session was called while disconnected.
    #[error("{0} adapter is not connected")]
    NotConnected(Protocol),

    /// The remote server answered with a JSON-RPC error.
    #[error("Server error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// No reply arrived for a request in time.
    #[error("Request '{method}' timed out after {after:?}")]
    RequestTimeout { method: String, after: Duration },

    /// The transport broke while a request was in flight.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server config is disabled.
    #[error("Server '{0}' is disabled")]
    ServerDisabled(String),

    /// Every candidate protocol failed.
    #[error("All protocols failed for server '{server_id}': {}", format_attempts(.attempts))]
    NegotiationExhausted {
        server_id: String,
        attempts: Vec<FailedAttempt>,
    },

    /// I/O error (config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed.
    #[error("Config file error: {0}")]
    ConfigFile(String),
}

fn format_attempts(attempts: &[FailedAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AdapterError {
    /// Whether the negotiator may move on to the next protocol.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            AdapterError::InvalidConfig(_)
                | AdapterError::ConnectionFailed { .. }
                | AdapterError::Timeout { .. }
                | AdapterError::Handshake { .. }
                | AdapterError::Transport(_)
        )
    }

    /// JSON-RPC code for remote errors.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            AdapterError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn connection(protocol: Protocol, reason: impl std::fmt::Display) -> Self {
        AdapterError::ConnectionFailed {
            protocol,
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias.
pub type AdapterResult<T> = Result<T, AdapterError>;
