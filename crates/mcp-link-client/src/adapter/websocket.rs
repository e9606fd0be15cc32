//! WebSocket adapter — one JSON-RPC message per text frame.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use mcp_link::Protocol;

use super::inbound;
use super::pending::PendingRequests;
use super::session::SessionState;
use crate::types::{
    AdapterError, AdapterResult, JsonRpcNotification, JsonRpcRequest, RpcReply,
};

/// How long a graceful close may take before the writer is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Outbound frame queue depth.
const WRITER_BUFFER: usize = 64;

/// Live socket: writer queue plus the two pump tasks.
struct WsLink {
    writer_tx: mpsc::Sender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// MCP over WebSocket.
pub struct WebSocketAdapter {
    session: SessionState,
    pending: PendingRequests,
    link: Mutex<Option<WsLink>>,
}

impl Default for WebSocketAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketAdapter {
    pub fn new() -> Self {
        Self {
            session: SessionState::new(Protocol::WebSocket),
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

    /// Open the socket and start the reader and writer tasks.
    pub(crate) async fn open(&self, url: &Url, generation: u64) -> AdapterResult<()> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| AdapterError::connection(Protocol::WebSocket, e))?;
        let (mut sink, mut source) = stream.split();

        tracing::info!("WebSocket connected to {url}");

        // Held across the spawns: no await point between starting the tasks
        // and storing their handles.
        let mut slot = self.link.lock().await;

        // ── Writer task: drains the outbound queue into the socket ─────
        let (writer_tx, mut writer_rx) = mpsc::channel::<WsMessage>(WRITER_BUFFER);
        let writer = tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!("WebSocket write error: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("WebSocket writer exiting");
        });

        // ── Reader task: routes replies and notifications ──────────────
        let reader = {
            let pending = self.pending.clone();
            let session = self.session.clone();
            let answers_tx = writer_tx.clone();
            tokio::spawn(async move {
                let reason = loop {
                    let text = match source.next().await {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => text,
                            Err(_) => continue,
                        },
                        Some(Ok(WsMessage::Close(frame))) => {
                            break format!("closed by server ({frame:?})");
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => break format!("read error: {e}"),
                        None => break "stream ended".to_string(),
                    };

                    for answer in inbound::route(&text, &pending, &session).await {
                        match serde_json::to_string(&answer) {
                            Ok(body) => {
                                let _ = answers_tx.send(WsMessage::Text(body)).await;
                            }
                            Err(e) => tracing::warn!("Cannot encode answer: {e}"),
                        }
                    }
                };

                if session.connection_lost(generation, &reason).await {
                    pending.fail_all().await;
                }
            })
        };

        *slot = Some(WsLink {
            writer_tx,
            reader,
            writer,
        });
        Ok(())
    }

    async fn writer(&self) -> AdapterResult<mpsc::Sender<WsMessage>> {
        self.link
            .lock()
            .await
            .as_ref()
            .map(|l| l.writer_tx.clone())
            .ok_or(AdapterError::NotConnected(Protocol::WebSocket))
    }

    async fn send_frame(&self, message: &impl serde::Serialize) -> AdapterResult<()> {
        let body = serde_json::to_string(message)?;
        self.writer()
            .await?
            .send(WsMessage::Text(body))
            .await
            .map_err(|_| AdapterError::Transport("WebSocket writer closed".to_string()))
    }

    pub(crate) async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> AdapterResult<RpcReply> {
        let rx = self.pending.register(request.id.clone()).await;
        if let Err(e) = self.send_frame(&request).await {
            self.pending.remove(&request.id).await;
            return Err(e);
        }
        self.pending
            .wait(&request.id, rx, &request.method, timeout)
            .await
    }

    pub(crate) async fn notify(&self, notification: JsonRpcNotification) -> AdapterResult<()> {
        self.send_frame(&notification).await
    }

    /// Send a close frame, stop the tasks and fail pending requests.
    pub(crate) async fn close(&self) {
        let link = self.link.lock().await.take();
        if let Some(mut link) = link {
            link.reader.abort();
            let _ = link.writer_tx.send(WsMessage::Close(None)).await;
            drop(link.writer_tx);
            if tokio::time::timeout(CLOSE_GRACE, &mut link.writer)
                .await
                .is_err()
            {
                link.writer.abort();
            }
            tracing::debug!("WebSocket closed");
        }
        self.pending.fail_all().await;
    }
}
