//! Stress tests: many in-flight requests and rapid reconnect cycles.
//!
//! Tests verify that replies are routed to the right caller when hundreds of
//! requests share one connection, and that repeated connect/disconnect cycles
//! leave no stale state behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;
use serde_json::{json, Value};

use mcp_link::{Protocol, ServerConfig};
use mcp_link_client::{Adapter, AdapterRegistry};

// ─── Helpers ───────────────────────────────────────────────────────────────

fn reply(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let result = match message["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "serverInfo": {"name": "stress-mock", "version": "1.0.0"}
        }),
        // Echo the params so callers can check they got their own answer.
        "echo" => message["params"].clone(),
        _ => json!({}),
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn ws_session(socket: WebSocket) {
    use futures::{SinkExt, StreamExt};

    // Answer out of order: each request is delayed by its own `delay_ms`.
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(tokio::sync::Mutex::new(sink));
    while let Some(Ok(Message::Text(text))) = stream.next().await {
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let Some(body) = reply(&message) else {
            continue;
        };
        let delay = message["params"]["delay_ms"].as_u64().unwrap_or(0);
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = sink.lock().await.send(Message::Text(body.to_string())).await;
        });
    }
}

async fn start_mock() -> std::net::SocketAddr {
    let app = Router::new()
        .route(
            "/mcp",
            post(|Json(message): Json<Value>| async move {
                Json(reply(&message).unwrap_or_else(|| json!({})))
            }),
        )
        .route(
            "/ws",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(ws_session) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connected(protocol: Protocol, url: String) -> Arc<Adapter> {
    let adapter = AdapterRegistry::new().create_adapter(protocol);
    let config =
        ServerConfig::new("stress", "stress", url, protocol).with_timeout(Duration::from_secs(10));
    adapter.connect(&config).await.unwrap();
    Arc::new(adapter)
}

async fn fire_echoes(adapter: &Arc<Adapter>, count: u64) -> Vec<(u64, Value)> {
    let calls = (0..count).map(|n| {
        let adapter = Arc::clone(adapter);
        async move {
            let params = json!({"n": n, "delay_ms": (count - n) % 20});
            let result = adapter.send_request("echo", Some(params)).await.unwrap();
            (n, result)
        }
    });
    join_all(calls).await
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_500_concurrent_requests_over_websocket() {
    let addr = start_mock().await;
    let adapter = connected(Protocol::WebSocket, format!("ws://{addr}/ws")).await;

    let start = Instant::now();
    let results = fire_echoes(&adapter, 500).await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 500);
    for (n, result) in &results {
        assert_eq!(result["n"].as_u64(), Some(*n), "reply routed to wrong caller");
    }
    assert_eq!(adapter.health_status().await.pending_requests, 0);
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");

    adapter.dispose().await;
}

#[tokio::test]
async fn test_200_concurrent_requests_over_http() {
    let addr = start_mock().await;
    let adapter = connected(Protocol::Http, format!("http://{addr}/mcp")).await;

    let results = fire_echoes(&adapter, 200).await;
    assert!(results
        .iter()
        .all(|(n, result)| result["n"].as_u64() == Some(*n)));

    adapter.dispose().await;
}

#[tokio::test]
async fn test_rapid_reconnect_cycles() {
    let addr = start_mock().await;
    let adapter = AdapterRegistry::new().create_adapter(Protocol::WebSocket);
    let url = format!("ws://{addr}/ws");
    let config = ServerConfig::new("cycle", "cycle", url, Protocol::WebSocket)
        .with_timeout(Duration::from_secs(5));

    for round in 0..25 {
        adapter.connect(&config).await.unwrap();
        let result = adapter
            .send_request("echo", Some(json!({"n": round})))
            .await
            .unwrap();
        assert_eq!(result["n"], round);
        adapter.disconnect().await;
        assert!(!adapter.is_connected());
    }

    let health = adapter.health_status().await;
    assert!(!health.connected);
    assert!(health.last_error.is_none(), "{:?}", health.last_error);
    assert_eq!(health.pending_requests, 0);
}
