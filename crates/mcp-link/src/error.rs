//! Errors produced while parsing or validating server configurations.

use thiserror::Error;

/// Why a protocol name, URL or server config was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The protocol name is not one of the registered transports.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A required field is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The URL could not be parsed or has no host.
    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The URL scheme is not handled by any transport.
    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    /// The URL scheme does not belong to the requested protocol.
    #[error("URL scheme '{scheme}' does not match protocol {protocol} (expected one of {expected})")]
    SchemeMismatch {
        scheme: String,
        protocol: String,
        expected: String,
    },

    /// A persisted config could not be (de)serialized.
    #[error("Invalid server config JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e.to_string())
    }
}

/// Convenience alias.
pub type ConfigResult<T> = Result<T, ConfigError>;
