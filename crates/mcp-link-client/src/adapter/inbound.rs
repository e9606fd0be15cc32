//! Routing of messages read from a streaming transport.

use serde_json::json;

use super::pending::PendingRequests;
use super::session::SessionState;
use crate::types::{
    error_codes, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
};

/// Route one inbound payload (a single message or a batch).
///
/// Replies resolve pending requests, notifications go to subscribers, and
/// server-initiated requests produce answers the caller must send back.
pub(crate) async fn route(
    text: &str,
    pending: &PendingRequests,
    session: &SessionState,
) -> Vec<JsonRpcMessage> {
    let messages = match parse(text.as_bytes()) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!("{}: unparseable message: {e}", session.protocol());
            return Vec::new();
        }
    };

    let mut answers = Vec::new();
    for message in messages {
        match message {
            JsonRpcMessage::Notification(n) => session.publish(n),
            JsonRpcMessage::Request(req) => answers.push(answer_server_request(req)),
            reply => {
                if let Some((id, outcome)) = reply.into_reply() {
                    pending.resolve(&id, outcome).await;
                }
            }
        }
    }
    answers
}

/// Decode a single message or a batch.
pub(crate) fn parse(raw: &[u8]) -> serde_json::Result<Vec<JsonRpcMessage>> {
    let is_batch = raw
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[');
    if is_batch {
        serde_json::from_slice(raw)
    } else {
        serde_json::from_slice(raw).map(|m| vec![m])
    }
}

/// The client only answers liveness checks.
fn answer_server_request(req: JsonRpcRequest) -> JsonRpcMessage {
    if req.method == "ping" {
        JsonRpcMessage::Response(JsonRpcResponse::new(req.id, json!({})))
    } else {
        tracing::debug!("Rejecting server request '{}'", req.method);
        JsonRpcMessage::Error(JsonRpcError::new(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not supported by client: {}", req.method),
        ))
    }
}
