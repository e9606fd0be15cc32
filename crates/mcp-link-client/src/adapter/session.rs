//! Per-adapter session state shared with background transport tasks.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use mcp_link::{HealthStatus, Protocol, DEFAULT_CONNECTION_TIMEOUT};

use crate::types::{InitializeResult, JsonRpcNotification};

/// Capacity of the notification fan-out channel.
const NOTIFICATION_BUFFER: usize = 256;

/// Connection flags, handshake result and notification fan-out of one adapter.
#[derive(Clone)]
pub(crate) struct SessionState {
    inner: Arc<Inner>,
}

struct Inner {
    protocol: Protocol,
    connected: AtomicBool,
    disposed: AtomicBool,
    next_id: AtomicI64,
    generation: AtomicU64,
    endpoint: RwLock<Option<String>>,
    server_info: RwLock<Option<InitializeResult>>,
    last_error: RwLock<Option<String>>,
    request_timeout: RwLock<Duration>,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

impl SessionState {
    pub(crate) fn new(protocol: Protocol) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            inner: Arc::new(Inner {
                protocol,
                connected: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                next_id: AtomicI64::new(1),
                generation: AtomicU64::new(0),
                endpoint: RwLock::new(None),
                server_info: RwLock::new(None),
                last_error: RwLock::new(None),
                request_timeout: RwLock::new(DEFAULT_CONNECTION_TIMEOUT),
                notifications,
            }),
        }
    }

    pub(crate) fn protocol(&self) -> Protocol {
        self.inner.protocol
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.inner.disposed.store(true, Ordering::Release);
    }

    /// Next JSON-RPC request id. Ids keep increasing across reconnects.
    pub(crate) fn next_id(&self) -> i64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Start a new session: clears the previous error and returns the
    /// generation that background tasks must present to tear it down.
    pub(crate) async fn begin(&self, endpoint: &str, request_timeout: Duration) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.endpoint.write().await = Some(endpoint.to_string());
        *self.inner.last_error.write().await = None;
        *self.inner.request_timeout.write().await = request_timeout;
        generation
    }

    /// End the current generation so its background tasks can no longer
    /// report a lost connection.
    pub(crate) fn retire(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Flip to connected after a successful handshake. Refused (returns
    /// false) when `generation` has ended in the meantime.
    pub(crate) fn mark_connected(&self, generation: u64) -> bool {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.inner.connected.store(true, Ordering::SeqCst);
        // A reader may have ended the session between the check and the store.
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            self.inner.connected.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Flip to disconnected and forget the handshake.
    pub(crate) async fn mark_disconnected(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.server_info.write().await = None;
    }

    /// Called by a background task whose stream ended. Ignored (returns
    /// false) when a newer session has started since the task was spawned.
    pub(crate) async fn connection_lost(&self, generation: u64, reason: &str) -> bool {
        // Ends the generation, so a handshake still in flight cannot mark it
        // connected afterwards.
        if self
            .inner
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        tracing::warn!("{} connection lost: {reason}", self.inner.protocol);
        self.record_error(reason).await;
        self.mark_disconnected().await;
        true
    }

    pub(crate) async fn record_error(&self, reason: impl Into<String>) {
        *self.inner.last_error.write().await = Some(reason.into());
    }

    pub(crate) async fn set_server_info(&self, info: InitializeResult) {
        *self.inner.server_info.write().await = Some(info);
    }

    pub(crate) async fn server_info(&self) -> Option<InitializeResult> {
        self.inner.server_info.read().await.clone()
    }

    pub(crate) async fn request_timeout(&self) -> Duration {
        *self.inner.request_timeout.read().await
    }

    pub(crate) fn publish(&self, notification: JsonRpcNotification) {
        tracing::debug!(
            "{} notification: {}",
            self.inner.protocol,
            notification.method
        );
        // No subscribers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.inner.notifications.subscribe()
    }

    pub(crate) async fn snapshot(&self, pending_requests: usize) -> HealthStatus {
        let info = self.inner.server_info.read().await.clone();
        HealthStatus {
            protocol: self.inner.protocol,
            connected: self.is_connected(),
            endpoint: self.inner.endpoint.read().await.clone(),
            server_name: info.as_ref().map(|i| i.server_info.name.clone()),
            server_version: info.as_ref().map(|i| i.server_info.version.clone()),
            protocol_version: info.map(|i| i.protocol_version),
            pending_requests,
            last_error: self.inner.last_error.read().await.clone(),
            checked_at: Utc::now(),
        }
    }
}
