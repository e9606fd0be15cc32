//! Point-in-time health snapshot of one adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;

/// Snapshot produced on demand; carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Transport of the adapter.
    pub protocol: Protocol,
    /// Whether a session is currently open.
    pub connected: bool,
    /// Endpoint of the open (or last) session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Server name reported during the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Server version reported during the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    /// Negotiated MCP protocol version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Requests awaiting a reply.
    pub pending_requests: usize,
    /// Most recent connection or transport failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the snapshot was taken.
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    /// Empty snapshot for a disconnected adapter.
    pub fn disconnected(protocol: Protocol) -> Self {
        Self {
            protocol,
            connected: false,
            endpoint: None,
            server_name: None,
            server_version: None,
            protocol_version: None,
            pending_requests: 0,
            last_error: None,
            checked_at: Utc::now(),
        }
    }

    /// Connected and no error recorded since.
    pub fn reachable(&self) -> bool {
        self.connected && self.last_error.is_none()
    }
}
