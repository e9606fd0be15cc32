//! Protocol auto-detection from a URL.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::protocol::Protocol;

/// Infer the transport for `url` from its scheme and shape.
///
/// `ws`/`wss` map to WebSocket. `http`/`https` map to HTTP unless the URL
/// carries an explicit SSE marker: a path segment `sse` or the query pair
/// `transport=sse`.
pub fn detect_protocol(url: &str) -> ConfigResult<Protocol> {
    let raw = url.trim();
    let parsed = Url::parse(raw).map_err(|e| ConfigError::MalformedUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let protocol = match parsed.scheme() {
        "ws" | "wss" => Protocol::WebSocket,
        "http" | "https" if has_sse_marker(&parsed) => Protocol::Sse,
        "http" | "https" => Protocol::Http,
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::MalformedUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    log::trace!("Detected {protocol} for {raw}");
    Ok(protocol)
}

fn has_sse_marker(url: &Url) -> bool {
    let in_path = url
        .path_segments()
        .map(|mut segments| segments.any(|s| s.eq_ignore_ascii_case("sse")))
        .unwrap_or(false);

    in_path
        || url
            .query_pairs()
            .any(|(k, v)| k == "transport" && v.eq_ignore_ascii_case("sse"))
}
