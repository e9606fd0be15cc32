//! Transport adapters.
//!
//! [`Adapter`] is a closed set of transports. Every operation dispatches with
//! an exhaustive `match`, so adding a transport is a compile error everywhere
//! it is not yet handled.

mod http;
mod inbound;
mod pending;
mod session;
mod sse;
pub mod sse_codec;
mod websocket;

pub use http::{HttpAdapter, SESSION_HEADER};
pub use sse::SseAdapter;
pub use websocket::WebSocketAdapter;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;

use mcp_link::{Feature, HealthStatus, Protocol, ServerConfig};

use crate::types::{
    AdapterError, AdapterResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, RequestId, RpcReply, ToolCallParams, ToolCallResult, ToolListResult,
};
use session::SessionState;

/// A connection to one MCP server over one transport.
pub enum Adapter {
    WebSocket(WebSocketAdapter),
    Http(HttpAdapter),
    Sse(SseAdapter),
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("protocol", &self.protocol())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Adapter {
    /// Create a disconnected adapter for `protocol`. HTTP-based transports
    /// send through `client`.
    pub fn new(protocol: Protocol, client: reqwest::Client) -> Self {
        match protocol {
            Protocol::WebSocket => Adapter::WebSocket(WebSocketAdapter::new()),
            Protocol::Http => Adapter::Http(HttpAdapter::new(client)),
            Protocol::Sse => Adapter::Sse(SseAdapter::new(client)),
        }
    }

    fn session(&self) -> &SessionState {
        match self {
            Adapter::WebSocket(a) => a.session(),
            Adapter::Http(a) => a.session(),
            Adapter::Sse(a) => a.session(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Adapter::WebSocket(_) => Protocol::WebSocket,
            Adapter::Http(_) => Protocol::Http,
            Adapter::Sse(_) => Protocol::Sse,
        }
    }

    /// Whether `config` could be used with this adapter. Never errors.
    pub fn validate_config(&self, config: &ServerConfig) -> bool {
        config.is_valid_for(self.protocol())
    }

    pub fn supported_features(&self) -> BTreeSet<Feature> {
        self.protocol().supported_features()
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_connected()
    }

    /// Connect and run the MCP handshake.
    ///
    /// Any previous session is torn down first. The whole attempt is bounded
    /// by the config's connection timeout; on failure the adapter is left
    /// disconnected with the reason recorded for [`Adapter::health_status`].
    pub async fn connect(&self, config: &ServerConfig) -> AdapterResult<()> {
        let protocol = self.protocol();
        if self.session().is_disposed() {
            return Err(AdapterError::connection(protocol, "adapter has been disposed"));
        }
        let url = config.check_for(protocol)?;

        self.disconnect().await;

        let timeout = config.connection_timeout();
        let generation = self.session().begin(url.as_str(), timeout).await;
        tracing::info!(
            "Connecting to '{}' over {protocol} at {url} (timeout {timeout:?})",
            config.id
        );

        let attempt = tokio::time::timeout(
            timeout,
            self.open_and_initialize(&url, generation, timeout),
        )
        .await
        .unwrap_or(Err(AdapterError::Timeout {
            protocol,
            after: timeout,
        }));

        let attempt = match attempt {
            Ok(info) => {
                let summary = format!(
                    "{} {} (MCP {})",
                    info.server_info.name, info.server_info.version, info.protocol_version
                );
                self.session().set_server_info(info).await;
                if self.session().mark_connected(generation) {
                    tracing::info!("Connected to '{}' over {protocol}: {summary}", config.id);
                    Ok(())
                } else {
                    Err(AdapterError::connection(
                        protocol,
                        "connection lost during handshake",
                    ))
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &attempt {
            tracing::warn!("{protocol} connect to '{}' failed: {e}", config.id);
            self.session().retire();
            self.close_transport().await;
            self.session().mark_disconnected().await;
            self.session().record_error(e.to_string()).await;
        }
        attempt
    }

    /// Open the transport and run `initialize`. The adapter only counts as
    /// connected once the caller has stored the result.
    async fn open_and_initialize(
        &self,
        url: &Url,
        generation: u64,
        timeout: Duration,
    ) -> AdapterResult<InitializeResult> {
        let protocol = self.protocol();
        match self {
            Adapter::WebSocket(a) => a.open(url, generation).await?,
            Adapter::Http(a) => a.open(url).await?,
            Adapter::Sse(a) => a.open(url, generation).await?,
        }

        let handshake = |reason: String| AdapterError::Handshake { protocol, reason };

        let params = serde_json::to_value(InitializeParams::for_client())?;
        let result = self
            .call("initialize", Some(params))
            .await
            .map_err(|e| match e {
                AdapterError::RequestTimeout { .. } => AdapterError::Timeout {
                    protocol,
                    after: timeout,
                },
                AdapterError::Rpc { .. }
                | AdapterError::Serialization(_)
                | AdapterError::Transport(_) => handshake(e.to_string()),
                other => other,
            })?;
        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| handshake(format!("bad initialize result: {e}")))?;
        if !info.version_matches() {
            tracing::warn!(
                "{protocol}: server answered with MCP version {}",
                info.protocol_version
            );
        }

        self.notify(JsonRpcNotification::new("notifications/initialized", None))
            .await
            .map_err(|e| handshake(e.to_string()))?;
        Ok(info)
    }

    /// Send a request and wait for its result.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> AdapterResult<Value> {
        if !self.is_connected() {
            return Err(AdapterError::NotConnected(self.protocol()));
        }
        let result = self.call(method, params).await;
        match &result {
            Err(e @ (AdapterError::Transport(_) | AdapterError::RequestTimeout { .. })) => {
                self.session().record_error(e.to_string()).await;
            }
            Err(e @ AdapterError::ConnectionFailed { .. }) => {
                // The endpoint no longer accepts connections.
                tracing::warn!("{} endpoint unreachable: {e}", self.protocol());
                self.session().retire();
                self.session().mark_disconnected().await;
                self.session().record_error(e.to_string()).await;
            }
            _ => {}
        }
        result
    }

    async fn call(&self, method: &str, params: Option<Value>) -> AdapterResult<Value> {
        let session = self.session();
        let request = JsonRpcRequest::new(RequestId::Number(session.next_id()), method, params);
        let timeout = session.request_timeout().await;
        tracing::debug!(
            "{} -> {} (id={})",
            self.protocol(),
            request.method,
            request.id
        );

        let reply: RpcReply = match self {
            Adapter::WebSocket(a) => a.request(request, timeout).await?,
            Adapter::Http(a) => a.request(request, timeout).await?,
            Adapter::Sse(a) => a.request(request, timeout).await?,
        };
        reply.map_err(|e| AdapterError::Rpc {
            code: e.code,
            message: e.message,
        })
    }

    /// Send a notification (no reply expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> AdapterResult<()> {
        if !self.is_connected() {
            return Err(AdapterError::NotConnected(self.protocol()));
        }
        self.notify(JsonRpcNotification::new(method, params)).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> AdapterResult<()> {
        match self {
            Adapter::WebSocket(a) => a.notify(notification).await,
            Adapter::Http(a) => a.notify(notification).await,
            Adapter::Sse(a) => a.notify(notification).await,
        }
    }

    async fn close_transport(&self) {
        match self {
            Adapter::WebSocket(a) => a.close().await,
            Adapter::Http(a) => a.close().await,
            Adapter::Sse(a) => a.close().await,
        }
    }

    /// Close the connection. Idempotent; pending requests fail.
    pub async fn disconnect(&self) {
        let was_connected = self.is_connected();
        self.session().retire();
        self.close_transport().await;
        self.session().mark_disconnected().await;
        if was_connected {
            tracing::info!("{} adapter disconnected", self.protocol());
        }
    }

    /// Disconnect for good. Idempotent; later `connect` calls fail.
    pub async fn dispose(&self) {
        self.session().mark_disposed();
        self.disconnect().await;
    }

    /// Local snapshot of the connection; no network I/O.
    pub async fn health_status(&self) -> HealthStatus {
        let pending = match self {
            Adapter::WebSocket(a) => a.pending_count().await,
            Adapter::Http(a) => a.pending_count().await,
            Adapter::Sse(a) => a.pending_count().await,
        };
        self.session().snapshot(pending).await
    }

    /// Round-trip a `ping` request.
    pub async fn ping(&self) -> AdapterResult<Duration> {
        let started = Instant::now();
        self.send_request("ping", Some(json!({}))).await?;
        Ok(started.elapsed())
    }

    /// Handshake result of the current session.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.session().server_info().await
    }

    pub async fn list_tools(&self) -> AdapterResult<ToolListResult> {
        let result = self.send_request("tools/list", None).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> AdapterResult<ToolCallResult> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })?;
        let result = self.send_request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Notifications sent by the server from now on.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.session().subscribe()
    }
}
