//! Requests awaiting a reply, keyed by JSON-RPC id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::types::{AdapterError, AdapterResult, RequestId, RpcReply};

/// Routes replies read by a background task to the waiting caller.
#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    inner: Arc<Mutex<HashMap<RequestId, oneshot::Sender<RpcReply>>>>,
}

impl PendingRequests {
    /// Register `id` before the request is written.
    pub(crate) async fn register(&self, id: RequestId) -> oneshot::Receiver<RpcReply> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id, tx);
        rx
    }

    /// Deliver a reply. Returns false for unknown ids.
    pub(crate) async fn resolve(&self, id: &RequestId, reply: RpcReply) -> bool {
        let sender = self.inner.lock().await.remove(id);
        match sender {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => {
                tracing::debug!("Reply for unknown id={id}, ignoring");
                false
            }
        }
    }

    pub(crate) async fn remove(&self, id: &RequestId) {
        self.inner.lock().await.remove(id);
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Drop every waiter; their callers see a transport error.
    pub(crate) async fn fail_all(&self) {
        let dropped = {
            let mut map = self.inner.lock().await;
            let n = map.len();
            map.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!("Failed {dropped} pending request(s)");
        }
    }

    /// Await the reply for `id`, removing it on timeout.
    pub(crate) async fn wait(
        &self,
        id: &RequestId,
        rx: oneshot::Receiver<RpcReply>,
        method: &str,
        timeout: Duration,
    ) -> AdapterResult<RpcReply> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AdapterError::Transport(format!(
                "connection closed before reply to '{method}' (id={id})"
            ))),
            Err(_) => {
                self.remove(id).await;
                Err(AdapterError::RequestTimeout {
                    method: method.to_string(),
                    after: timeout,
                })
            }
        }
    }
}
