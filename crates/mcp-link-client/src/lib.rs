//! mcp-link client — connects to MCP servers over WebSocket, HTTP or SSE.
//!
//! An [`AdapterRegistry`] holds one adapter per transport; a
//! [`ProtocolNegotiator`] connects to a [`mcp_link::ServerConfig`] by trying
//! its preferred protocol and then each fallback in order.

pub mod adapter;
pub mod config;
pub mod negotiation;
pub mod registry;
pub mod types;

pub use adapter::{Adapter, HttpAdapter, SseAdapter, WebSocketAdapter};
pub use config::{load_config, resolve_config_path, save_config, ClientConfig};
pub use negotiation::{
    ConnectionReport, Negotiated, Negotiation, NegotiationState, ProtocolNegotiator,
};
pub use registry::{AdapterRegistry, RegistryStats};
pub use types::{AdapterError, AdapterResult, FailedAttempt};
