//! HTTP adapter — one JSON-RPC request per POST.
//!
//! The reply is either a JSON body or a short `text/event-stream` body whose
//! events carry the reply (and possibly notifications sent before it). A
//! session id issued by the server in `Mcp-Session-Id` is echoed on every
//! later request and released with a `DELETE` on disconnect.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::RwLock;
use url::Url;

use mcp_link::Protocol;

use super::inbound;
use super::session::SessionState;
use super::sse_codec::{SseDecoder, SseEvent};
use crate::types::{
    AdapterError, AdapterResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
    RpcReply,
};

/// Header carrying the server-issued session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Accept header for POSTs: plain JSON or a reply stream.
const ACCEPT_REPLY: &str = "application/json, text/event-stream";

/// Bound on the session-release DELETE sent during disconnect.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct HttpLink {
    endpoint: Url,
    session_id: Option<String>,
}

/// MCP over plain HTTP request/response.
pub struct HttpAdapter {
    session: SessionState,
    client: reqwest::Client,
    link: RwLock<Option<HttpLink>>,
}

impl HttpAdapter {
    /// Create an adapter that sends through `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            session: SessionState::new(Protocol::Http),
            client,
            link: RwLock::new(None),
        }
    }

    pub(crate) fn session(&self) -> &SessionState {
        &self.session
    }

    pub(crate) async fn pending_count(&self) -> usize {
        // Requests are synchronous round-trips; nothing is parked.
        0
    }

    /// Server-issued session id, once the handshake produced one.
    pub async fn session_id(&self) -> Option<String> {
        self.link
            .read()
            .await
            .as_ref()
            .and_then(|l| l.session_id.clone())
    }

    /// Nothing is opened up front: reachability is proven by the first POST
    /// (the initialize request).
    pub(crate) async fn open(&self, url: &Url) -> AdapterResult<()> {
        *self.link.write().await = Some(HttpLink {
            endpoint: url.clone(),
            session_id: None,
        });
        tracing::debug!("HTTP endpoint set to {url}");
        Ok(())
    }

    async fn current_link(&self) -> AdapterResult<HttpLink> {
        self.link
            .read()
            .await
            .clone()
            .ok_or(AdapterError::NotConnected(Protocol::Http))
    }

    async fn post(
        &self,
        body: &impl serde::Serialize,
        method: &str,
        timeout: Duration,
    ) -> AdapterResult<reqwest::Response> {
        let link = self.current_link().await?;

        let mut builder = self
            .client
            .post(link.endpoint.clone())
            .header(ACCEPT, ACCEPT_REPLY)
            .json(body)
            .timeout(timeout);
        if let Some(sid) = &link.session_id {
            builder = builder.header(SESSION_HEADER, sid);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                AdapterError::connection(Protocol::Http, e)
            } else if e.is_timeout() {
                AdapterError::RequestTimeout {
                    method: method.to_string(),
                    after: timeout,
                }
            } else {
                AdapterError::Transport(e.to_string())
            }
        })?;

        if link.session_id.is_none() {
            if let Some(sid) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                tracing::debug!("HTTP session id issued: {sid}");
                if let Some(l) = self.link.write().await.as_mut() {
                    l.session_id = Some(sid.to_string());
                }
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Transport(format!(
                "HTTP {status} from {}",
                link.endpoint
            )));
        }
        Ok(response)
    }

    pub(crate) async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> AdapterResult<RpcReply> {
        let response = self.post(&request, &request.method, timeout).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_stream {
            return self.read_stream_reply(response, &request).await;
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::RequestTimeout {
                    method: request.method.clone(),
                    after: timeout,
                }
            } else {
                AdapterError::Transport(e.to_string())
            }
        })?;
        let messages = inbound::parse(&bytes)?;
        self.take_reply(messages, &request.id).ok_or_else(|| {
            AdapterError::Transport(format!(
                "no reply for '{}' in HTTP response body",
                request.method
            ))
        })
    }

    /// Read events until the reply to `request` shows up.
    async fn read_stream_reply(
        &self,
        response: reqwest::Response,
        request: &JsonRpcRequest,
    ) -> AdapterResult<RpcReply> {
        let mut stream = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AdapterError::Transport(e.to_string()))?;
            for event in decoder.feed(&chunk) {
                if let Some(reply) = self.absorb_event(event, &request.id) {
                    return Ok(reply);
                }
            }
        }
        if let Some(reply) = decoder
            .finish()
            .and_then(|event| self.absorb_event(event, &request.id))
        {
            return Ok(reply);
        }

        Err(AdapterError::Transport(format!(
            "event stream ended without a reply to '{}'",
            request.method
        )))
    }

    fn absorb_event(&self, event: SseEvent, id: &RequestId) -> Option<RpcReply> {
        if event.event_type() != "message" {
            return None;
        }
        match inbound::parse(event.data.as_bytes()) {
            Ok(messages) => self.take_reply(messages, id),
            Err(e) => {
                tracing::warn!("HTTP stream: unparseable event: {e}");
                None
            }
        }
    }

    /// Return the outcome of the message answering `id`; publish
    /// notifications. A batch may carry both.
    fn take_reply(&self, messages: Vec<JsonRpcMessage>, id: &RequestId) -> Option<RpcReply> {
        let mut found = None;
        for message in messages {
            match message {
                JsonRpcMessage::Notification(n) => self.session.publish(n),
                JsonRpcMessage::Request(req) => {
                    tracing::debug!("HTTP: ignoring server request '{}'", req.method);
                }
                reply => match reply.into_reply() {
                    Some((reply_id, outcome))
                        if found.is_none()
                            && (&reply_id == id || reply_id == RequestId::Null) =>
                    {
                        found = Some(outcome);
                    }
                    Some((reply_id, _)) => {
                        tracing::debug!("HTTP: reply for unexpected id={reply_id}");
                    }
                    None => {}
                },
            }
        }
        found
    }

    pub(crate) async fn notify(&self, notification: JsonRpcNotification) -> AdapterResult<()> {
        let timeout = self.session.request_timeout().await;
        self.post(&notification, &notification.method, timeout)
            .await
            .map(|_| ())
    }

    /// Forget the endpoint, releasing the server session if one was issued.
    pub(crate) async fn close(&self) {
        let link = self.link.write().await.take();
        let Some(HttpLink {
            endpoint,
            session_id: Some(sid),
        }) = link
        else {
            return;
        };

        let release = self
            .client
            .delete(endpoint)
            .header(SESSION_HEADER, &sid)
            .timeout(RELEASE_TIMEOUT)
            .send()
            .await;
        match release {
            Ok(r) => tracing::debug!("HTTP session {sid} released ({})", r.status()),
            Err(e) => tracing::debug!("HTTP session {sid} release failed: {e}"),
        }
    }
}
