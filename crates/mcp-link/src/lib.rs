//! mcp-link — transport model for MCP (Model Context Protocol) clients.
//!
//! This crate holds the pure, I/O-free part of the adapter layer: the closed
//! set of wire protocols, the persisted server configuration, URL validation
//! and auto-detection, the negotiation strategy derived from a config, and the
//! health snapshot adapters report. The async adapters themselves live in
//! `mcp-link-client`.

pub mod config;
pub mod detect;
pub mod error;
pub mod health;
pub mod protocol;
pub mod strategy;

pub use config::{ServerConfig, DEFAULT_CONNECTION_TIMEOUT};
pub use detect::detect_protocol;
pub use error::{ConfigError, ConfigResult};
pub use health::HealthStatus;
pub use protocol::{Feature, Protocol, DEFAULT_FALLBACK_ORDER};
pub use strategy::NegotiationStrategy;
