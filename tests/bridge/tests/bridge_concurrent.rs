//! Concurrent access: many adapters and negotiations running at once.
//!
//! Tests verify that adapter instances are independent, that disposal and
//! health checks can run concurrently, and that one registry can serve
//! parallel negotiations loaded from a config file.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::Barrier;

use mcp_link::{Protocol, ServerConfig};
use mcp_link_client::config::{load_config, save_config, ClientConfig};
use mcp_link_client::{Adapter, AdapterRegistry, ProtocolNegotiator};

// ─── Helpers ───────────────────────────────────────────────────────────────

fn reply(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let result = match message["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "bridge-mock", "version": "1.0.0"}
        }),
        "tools/call" => json!({
            "content": [{"type": "text", "text": message["params"]["arguments"]["text"]}]
        }),
        _ => json!({}),
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn http_post(Json(message): Json<Value>) -> Response {
    match reply(&message) {
        Some(body) => Json(body).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn ws_session(mut socket: WebSocket) {
    while let Some(Ok(Message::Text(text))) = socket.recv().await {
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if let Some(body) = reply(&message) {
            if socket.send(Message::Text(body.to_string())).await.is_err() {
                return;
            }
        }
    }
}

/// Start an HTTP + WebSocket mock; returns its address.
async fn start_mock() -> std::net::SocketAddr {
    let app = Router::new()
        .route("/mcp", post(http_post))
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

fn http_config(addr: std::net::SocketAddr, id: &str) -> ServerConfig {
    ServerConfig::new(id, id, format!("http://{addr}/mcp"), Protocol::Http)
        .with_timeout(Duration::from_secs(5))
}

fn ws_config(addr: std::net::SocketAddr, id: &str) -> ServerConfig {
    ServerConfig::new(id, id, format!("ws://{addr}/ws"), Protocol::WebSocket)
        .with_timeout(Duration::from_secs(5))
}

// ─── Tests ─────────────────────────────────────────────────────────────────

/// Two HTTP adapters and one WebSocket adapter disposed at the same time.
#[tokio::test]
async fn test_concurrent_dispose() {
    let addr = start_mock().await;
    let registry = AdapterRegistry::new();

    let adapters = vec![
        Arc::new(registry.create_adapter(Protocol::Http)),
        Arc::new(registry.create_adapter(Protocol::Http)),
        Arc::new(registry.create_adapter(Protocol::WebSocket)),
    ];
    adapters[0].connect(&http_config(addr, "h1")).await.unwrap();
    adapters[1].connect(&http_config(addr, "h2")).await.unwrap();
    adapters[2].connect(&ws_config(addr, "w1")).await.unwrap();
    assert!(adapters.iter().all(|a| a.is_connected()));

    let barrier = Arc::new(Barrier::new(adapters.len()));
    let tasks: Vec<_> = adapters
        .iter()
        .map(|adapter| {
            let adapter = Arc::clone(adapter);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                adapter.dispose().await;
            })
        })
        .collect();
    for task in join_all(tasks).await {
        task.unwrap();
    }

    assert!(adapters.iter().all(|a| !a.is_connected()));
}

/// Health snapshots of independent adapters never block each other.
#[tokio::test]
async fn test_concurrent_health_checks() {
    let addr = start_mock().await;
    let registry = AdapterRegistry::new();

    let mut adapters: Vec<Arc<Adapter>> = Vec::new();
    for i in 0..4 {
        let adapter = Arc::new(registry.create_adapter(Protocol::WebSocket));
        adapter
            .connect(&ws_config(addr, &format!("w{i}")))
            .await
            .unwrap();
        adapters.push(adapter);
    }
    // One disconnected adapter in the mix.
    adapters.push(Arc::new(registry.create_adapter(Protocol::Http)));

    let snapshots = tokio::time::timeout(
        Duration::from_secs(5),
        join_all(adapters.iter().map(|a| a.health_status())),
    )
    .await
    .expect("health checks finish");

    assert_eq!(snapshots.iter().filter(|h| h.connected).count(), 4);
    assert!(snapshots
        .iter()
        .filter(|h| h.connected)
        .all(|h| h.server_name.as_deref() == Some("bridge-mock")));
    assert!(!snapshots[4].connected);

    join_all(adapters.iter().map(|a| a.dispose())).await;
}

/// Parallel negotiations through one registry get their own adapters.
#[tokio::test]
async fn test_concurrent_negotiations_from_config_file() {
    let addr = start_mock().await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("servers.json");

    let config = ClientConfig {
        servers: vec![
            http_config(addr, "plain-http"),
            ws_config(addr, "plain-ws"),
            // Falls back from WebSocket to HTTP.
            ServerConfig::new(
                "fallback",
                "fallback",
                format!("ws://{addr}/mcp"),
                Protocol::WebSocket,
            )
            .with_fallbacks(vec![Protocol::Http]),
            http_config(addr, "off").with_enabled(false),
        ],
        default_timeout: Some(5),
        ..ClientConfig::default()
    };
    save_config(&path, &config).unwrap();
    let loaded = load_config(&path).unwrap();

    let negotiator = Arc::new(ProtocolNegotiator::new(Arc::new(AdapterRegistry::new())));
    let results = join_all(loaded.enabled_servers().map(|server| {
        let negotiator = Arc::clone(&negotiator);
        let server = server.clone();
        async move { (server.id.clone(), negotiator.negotiate(&server).await) }
    }))
    .await;

    assert_eq!(results.len(), 3);
    for (id, result) in &results {
        let negotiated = result.as_ref().unwrap_or_else(|e| panic!("{id}: {e}"));
        let expected = match id.as_str() {
            "plain-ws" => Protocol::WebSocket,
            _ => Protocol::Http,
        };
        assert_eq!(negotiated.protocol, expected, "{id}");
        assert!(negotiated.adapter.is_connected());
    }

    // The registry's shared adapters were not used.
    assert_eq!(negotiator.registry().stats().connected, 0);

    for (_, result) in results {
        result.unwrap().adapter.dispose().await;
    }
}
