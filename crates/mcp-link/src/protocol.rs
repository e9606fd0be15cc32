//! The closed set of MCP wire protocols and their static capabilities.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// A transport an MCP server can be reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// JSON-RPC messages as WebSocket text frames.
    WebSocket,
    /// One JSON-RPC request per HTTP POST.
    Http,
    /// Long-lived event stream plus a POST endpoint for requests.
    Sse,
}

/// Order used for fallbacks when a config does not list its own.
pub const DEFAULT_FALLBACK_ORDER: [Protocol; 3] = [Protocol::Http, Protocol::Sse, Protocol::WebSocket];

impl Protocol {
    /// Every protocol, in registration order.
    pub const ALL: [Protocol; 3] = [Protocol::WebSocket, Protocol::Http, Protocol::Sse];

    /// Canonical name, as persisted and as used for registry lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::WebSocket => "websocket",
            Protocol::Http => "http",
            Protocol::Sse => "sse",
        }
    }

    /// URL schemes a config must use to be valid for this protocol.
    pub fn expected_schemes(&self) -> &'static [&'static str] {
        match self {
            Protocol::WebSocket => &["ws", "wss"],
            Protocol::Http | Protocol::Sse => &["http", "https"],
        }
    }

    /// Whether `scheme` (case-insensitive) belongs to this protocol.
    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        self.expected_schemes()
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Static capability set of the transport.
    pub fn supported_features(&self) -> BTreeSet<Feature> {
        let features: &[Feature] = match self {
            Protocol::WebSocket => &[
                Feature::BidirectionalStreaming,
                Feature::ServerPush,
                Feature::Notifications,
            ],
            Protocol::Http => &[Feature::RequestResponse, Feature::SessionResumption],
            Protocol::Sse => &[
                Feature::ServerPush,
                Feature::Notifications,
                Feature::RequestResponse,
            ],
        };
        features.iter().copied().collect()
    }

    /// [`DEFAULT_FALLBACK_ORDER`] without `self`.
    pub fn default_fallbacks(&self) -> Vec<Protocol> {
        DEFAULT_FALLBACK_ORDER
            .iter()
            .copied()
            .filter(|p| p != self)
            .collect()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" | "wss" => Ok(Protocol::WebSocket),
            "http" | "https" => Ok(Protocol::Http),
            "sse" | "event-stream" => Ok(Protocol::Sse),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A capability a transport offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Both sides can send at any time over one connection.
    BidirectionalStreaming,
    /// Plain request in, reply out.
    RequestResponse,
    /// The server can push messages without a pending request.
    ServerPush,
    /// Server notifications are delivered to subscribers.
    Notifications,
    /// A server-issued session id is carried across requests.
    SessionResumption,
}

impl Feature {
    /// Wire name of the feature.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::BidirectionalStreaming => "bidirectional-streaming",
            Feature::RequestResponse => "request-response",
            Feature::ServerPush => "server-push",
            Feature::Notifications => "notifications",
            Feature::SessionResumption => "session-resumption",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
