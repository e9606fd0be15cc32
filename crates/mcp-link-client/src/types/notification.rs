//! Server-to-client notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::JsonRpcNotification;

/// Progress token, either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// String token.
    String(String),
    /// Numeric token.
    Number(i64),
}

/// Progress notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// The progress token from the original request.
    pub progress_token: ProgressToken,
    /// Current progress value.
    pub progress: f64,
    /// Optional total progress value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// Log message notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    /// Log level as sent by the server (debug, info, warning, error, ...).
    pub level: String,
    /// Optional logger name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Log message data.
    pub data: Value,
}

/// Resource updated notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    /// URI of the updated resource.
    pub uri: String,
}

/// A decoded server notification.
#[derive(Debug, Clone)]
pub enum ServerNotification {
    /// `notifications/progress`
    Progress(ProgressParams),
    /// `notifications/message`
    LogMessage(LogMessageParams),
    /// `notifications/tools/list_changed`
    ToolsListChanged,
    /// `notifications/resources/updated`
    ResourceUpdated(ResourceUpdatedParams),
    /// Anything else, or a known method with unreadable params.
    Other(JsonRpcNotification),
}

impl From<JsonRpcNotification> for ServerNotification {
    fn from(n: JsonRpcNotification) -> Self {
        let params = n.params.clone().unwrap_or(Value::Null);
        let decoded = match n.method.as_str() {
            "notifications/progress" => serde_json::from_value(params)
                .ok()
                .map(ServerNotification::Progress),
            "notifications/message" => serde_json::from_value(params)
                .ok()
                .map(ServerNotification::LogMessage),
            "notifications/tools/list_changed" => Some(ServerNotification::ToolsListChanged),
            "notifications/resources/updated" => serde_json::from_value(params)
                .ok()
                .map(ServerNotification::ResourceUpdated),
            _ => None,
        };
        decoded.unwrap_or(ServerNotification::Other(n))
    }
}
