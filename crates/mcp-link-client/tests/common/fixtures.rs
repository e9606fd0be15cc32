//! In-process mock MCP server with HTTP, SSE and WebSocket routes.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Session id the HTTP route issues on `initialize`.
pub const MOCK_SESSION_ID: &str = "mock-session-1";

/// Server name reported by the handshake.
pub const MOCK_SERVER_NAME: &str = "mock-mcp";

#[derive(Clone, Default)]
struct MockState {
    sse_clients: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<String>>>>,
    next_sse_id: Arc<AtomicUsize>,
    released_sessions: Arc<Mutex<Vec<String>>>,
    http_posts: Arc<AtomicUsize>,
}

/// A running mock server bound to `127.0.0.1:0`.
pub struct MockServer {
    pub addr: SocketAddr,
    state: MockState,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/mcp", post(http_post).delete(http_delete))
            .route("/sse", get(sse_stream))
            .route("/messages", post(sse_post))
            .route("/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self { addr, state, task }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    pub fn sse_url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Session ids released with `DELETE /mcp`.
    pub async fn released_sessions(&self) -> Vec<String> {
        self.state.released_sessions.lock().await.clone()
    }

    /// Number of POSTs received on `/mcp`.
    pub fn http_posts(&self) -> usize {
        self.state.http_posts.load(Ordering::SeqCst)
    }

    /// Push a notification to every open SSE stream.
    pub async fn broadcast_sse(&self, method: &str, params: Value) {
        let body = json!({"jsonrpc": "2.0", "method": method, "params": params}).to_string();
        for tx in self.state.sse_clients.lock().await.values() {
            let _ = tx.send(body.clone());
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─── Method handling ───────────────────────────────────────────────────────

/// What the server sends back for one inbound message: notifications first,
/// then the reply (if the message was a request).
struct Outcome {
    notifications: Vec<Value>,
    reply: Option<Value>,
}

fn handle(message: &Value) -> Outcome {
    let mut notifications = Vec::new();
    let Some(id) = message.get("id").cloned() else {
        return Outcome {
            notifications,
            reply: None,
        };
    };
    let method = message["method"].as_str().unwrap_or_default();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {"listChanged": true}, "logging": {}},
            "serverInfo": {"name": MOCK_SERVER_NAME, "version": "0.1.0"}
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({
            "tools": [{
                "name": "echo",
                "description": "Echo the text argument",
                "inputSchema": {
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }
            }]
        })),
        "tools/call" => match params["name"].as_str() {
            Some("echo") => Ok(json!({
                "content": [{
                    "type": "text",
                    "text": params["arguments"]["text"].as_str().unwrap_or_default()
                }]
            })),
            _ => Ok(json!({
                "content": [{"type": "text", "text": "unknown tool"}],
                "isError": true
            })),
        },
        "test/emit" => {
            notifications.push(json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": {"level": "info", "data": "hello from mock"}
            }));
            Ok(json!({"emitted": 1}))
        }
        "test/batch" => {
            notifications.push(json!({
                "jsonrpc": "2.0",
                "method": "notifications/tools/list_changed"
            }));
            Ok(json!({"batched": true}))
        }
        other => Err(json!({"code": -32601, "message": format!("Method not found: {other}")})),
    };

    let reply = match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
    };
    Outcome {
        notifications,
        reply: Some(reply),
    }
}

// ─── HTTP ──────────────────────────────────────────────────────────────────

async fn http_post(State(state): State<MockState>, Json(message): Json<Value>) -> Response {
    state.http_posts.fetch_add(1, Ordering::SeqCst);
    let is_initialize = message["method"] == "initialize";
    let is_batch = message["method"] == "test/batch";
    let outcome = handle(&message);

    let Some(reply) = outcome.reply else {
        return StatusCode::ACCEPTED.into_response();
    };

    if is_batch {
        // One JSON array: notifications, then the result.
        let mut batch = outcome.notifications;
        batch.push(reply);
        return Json(Value::Array(batch)).into_response();
    }

    if !outcome.notifications.is_empty() {
        // Streamed reply: notifications, then the result.
        let mut body = String::new();
        for event in outcome.notifications.iter().chain(std::iter::once(&reply)) {
            body.push_str(&format!("event: message\ndata: {event}\n\n"));
        }
        return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    }

    if is_initialize {
        return ([("mcp-session-id", MOCK_SESSION_ID)], Json(reply)).into_response();
    }
    Json(reply).into_response()
}

async fn http_delete(State(state): State<MockState>, headers: HeaderMap) -> StatusCode {
    match headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) {
        Some(sid) => {
            state.released_sessions.lock().await.push(sid.to_string());
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

// ─── SSE ───────────────────────────────────────────────────────────────────

async fn sse_stream(
    State(state): State<MockState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = state.next_sse_id.fetch_add(1, Ordering::SeqCst).to_string();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    state.sse_clients.lock().await.insert(id.clone(), tx);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={id}"));
    let messages = UnboundedReceiverStream::new(rx)
        .map(|body| Ok::<_, Infallible>(Event::default().event("message").data(body)));

    Sse::new(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

async fn sse_post(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<Value>,
) -> StatusCode {
    let Some(id) = query.get("sessionId") else {
        return StatusCode::BAD_REQUEST;
    };
    let clients = state.sse_clients.lock().await;
    let Some(tx) = clients.get(id) else {
        return StatusCode::NOT_FOUND;
    };

    let outcome = handle(&message);
    for event in outcome.notifications.into_iter().chain(outcome.reply) {
        let _ = tx.send(event.to_string());
    }
    StatusCode::ACCEPTED
}

// ─── WebSocket ─────────────────────────────────────────────────────────────

async fn ws_upgrade(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(ws_session)
}

async fn ws_session(mut socket: WebSocket) {
    while let Some(Ok(frame)) = socket.recv().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if message["method"] == "test/drop" {
            // Hang up without answering.
            let _ = socket.send(Message::Close(None)).await;
            return;
        }

        let outcome = handle(&message);
        for event in outcome.notifications.into_iter().chain(outcome.reply) {
            if socket.send(Message::Text(event.to_string())).await.is_err() {
                return;
            }
        }
    }
}

// ─── Misbehaving peers ─────────────────────────────────────────────────────

/// Accepts TCP connections and never writes a byte.
pub async fn start_silent_peer() -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (addr, handle)
}

/// Plain HTTP/1.1 endpoint that answers `initialize` and the following
/// notification (one request per connection), then stops listening. The
/// receiver fires once the port is closed.
pub async fn start_short_lived_http() -> (SocketAddr, tokio::sync::oneshot::Receiver<()>) {
    use tokio::io::AsyncWriteExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        for _ in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();
            let body = read_http_body(&mut socket).await;
            let message: Value = serde_json::from_slice(&body).unwrap();

            let response = match handle(&message).reply {
                Some(reply) => {
                    let payload = reply.to_string();
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{payload}",
                        payload.len()
                    )
                }
                None => "HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    .to_string(),
            };
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        drop(listener);
        let _ = closed_tx.send(());
    });
    (addr, closed_rx)
}

async fn read_http_body(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            while buf.len() < start + len {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            return buf[start..start + len].to_vec();
        }
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-headers");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// WebSocket endpoint that accepts the upgrade and never answers. The
/// receiver fires when the client closes its socket.
pub async fn start_mute_websocket() -> (SocketAddr, tokio::sync::oneshot::Receiver<()>) {
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    let closed_tx = Arc::new(Mutex::new(Some(closed_tx)));

    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let closed_tx = Arc::clone(&closed_tx);
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(message)) = socket.recv().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    if let Some(tx) = closed_tx.lock().await.take() {
                        let _ = tx.send(());
                    }
                })
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, closed_rx)
}
