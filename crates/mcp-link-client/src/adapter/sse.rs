//! SSE adapter: replies arrive on a long-lived event stream, requests are
//! POSTed to the endpoint the server announces in its first `endpoint` event.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use mcp_link::Protocol;

use super::inbound;
use super::pending::PendingRequests;
use super::session::SessionState;
use super::sse_codec::{SseDecoder, SseEvent};
use crate::types::{AdapterError, AdapterResult, JsonRpcNotification, JsonRpcRequest, RpcReply};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Event name carrying the POST endpoint.
const ENDPOINT_EVENT: &str = "endpoint";

/// Event name carrying JSON-RPC payloads.
const MESSAGE_EVENT: &str = "message";

struct SseLink {
    post_url: Url,
    reader: JoinHandle<()>,
}

/// MCP over Server-Sent Events.
pub struct SseAdapter {
    session: SessionState,
    client: reqwest::Client,
    pending: PendingRequests,
    link: Mutex<Option<SseLink>>,
}

impl SseAdapter {
    /// Create an adapter that streams and posts through `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            session: SessionState::new(Protocol::Sse),
            client,
            pending: PendingRequests::default(),
            link: Mutex::new(None),
        }
    }

    pub(crate) fn session(&self) -> &SessionState {
        &self.session
    }

    pub(crate) async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// POST endpoint announced by the server, while connected.
    pub async fn post_url(&self) -> Option<Url> {
        self.link.lock().await.as_ref().map(|l| l.post_url.clone())
    }

    /// Open the event stream, wait for the endpoint event and start the
    /// reader task.
    pub(crate) async fn open(&self, url: &Url, generation: u64) -> AdapterResult<()> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| AdapterError::connection(Protocol::Sse, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::connection(
                Protocol::Sse,
                format!("HTTP {status} from {url}"),
            ));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(AdapterError::connection(
                Protocol::Sse,
                format!("expected text/event-stream, got '{content_type}'"),
            ));
        }

        let mut stream: ByteStream = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        let mut early = VecDeque::new();

        // ── Wait for the endpoint announcement ─────────────────────────
        let post_url = loop {
            if let Some(pos) = early
                .iter()
                .position(|e: &SseEvent| e.event_type() == ENDPOINT_EVENT)
            {
                let event = early.remove(pos).unwrap_or_default();
                break url.join(event.data.trim()).map_err(|e| {
                    AdapterError::connection(
                        Protocol::Sse,
                        format!("bad endpoint '{}': {e}", event.data),
                    )
                })?;
            }
            match stream.next().await {
                Some(Ok(chunk)) => early.extend(decoder.feed(&chunk)),
                Some(Err(e)) => return Err(AdapterError::connection(Protocol::Sse, e)),
                None => {
                    return Err(AdapterError::connection(
                        Protocol::Sse,
                        "stream ended before the endpoint event",
                    ))
                }
            }
        };

        tracing::info!("SSE connected to {url}, posting to {post_url}");

        let mut slot = self.link.lock().await;

        // ── Reader task: routes message events ─────────────────────────
        let reader = {
            let pending = self.pending.clone();
            let session = self.session.clone();
            let client = self.client.clone();
            let post_url = post_url.clone();
            tokio::spawn(async move {
                let dispatch = |event: SseEvent| {
                    let pending = pending.clone();
                    let session = session.clone();
                    let client = client.clone();
                    let post_url = post_url.clone();
                    async move {
                        if event.event_type() != MESSAGE_EVENT {
                            tracing::debug!("SSE: ignoring '{}' event", event.event_type());
                            return;
                        }
                        for answer in inbound::route(&event.data, &pending, &session).await {
                            if let Err(e) = client.post(post_url.clone()).json(&answer).send().await
                            {
                                tracing::warn!("SSE: cannot send answer: {e}");
                            }
                        }
                    }
                };

                for event in early {
                    dispatch(event).await;
                }

                let reason = loop {
                    match stream.next().await {
                        Some(Ok(chunk)) => {
                            for event in decoder.feed(&chunk) {
                                dispatch(event).await;
                            }
                        }
                        Some(Err(e)) => break format!("read error: {e}"),
                        None => {
                            if let Some(event) = decoder.finish() {
                                dispatch(event).await;
                            }
                            break "stream ended".to_string();
                        }
                    }
                };

                if session.connection_lost(generation, &reason).await {
                    pending.fail_all().await;
                }
            })
        };

        *slot = Some(SseLink { post_url, reader });
        Ok(())
    }

    async fn post(&self, body: &impl serde::Serialize, timeout: Duration) -> AdapterResult<()> {
        let post_url = self
            .post_url()
            .await
            .ok_or(AdapterError::NotConnected(Protocol::Sse))?;

        let response = self
            .client
            .post(post_url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Transport(format!("POST rejected: HTTP {status}")));
        }
        Ok(())
    }

    pub(crate) async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> AdapterResult<RpcReply> {
        let rx = self.pending.register(request.id.clone()).await;
        if let Err(e) = self.post(&request, timeout).await {
            self.pending.remove(&request.id).await;
            return Err(e);
        }
        self.pending
            .wait(&request.id, rx, &request.method, timeout)
            .await
    }

    pub(crate) async fn notify(&self, notification: JsonRpcNotification) -> AdapterResult<()> {
        let timeout = self.session.request_timeout().await;
        self.post(&notification, timeout).await
    }

    /// Stop reading the stream and fail pending requests.
    pub(crate) async fn close(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.reader.abort();
            tracing::debug!("SSE stream closed");
        }
        self.pending.fail_all().await;
    }
}
