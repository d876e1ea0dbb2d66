//! Wire types exchanged with attached contexts.

use ember_core::errors::RpcErrorBody;
use ember_core::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming request from a trusted UI surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Unique request identifier.
    pub id: String,
    /// Method name (e.g. `sendMessage`).
    pub method: String,
    /// Optional parameters object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<String>, error: &RpcError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.to_error_body()),
        }
    }
}

/// Server-pushed JSON-RPC notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Notification name (e.g. `networkChanged`).
    pub method: String,
    /// Payload.
    pub params: Value,
    /// RFC 3339 timestamp with millisecond precision.
    pub timestamp: String,
}

impl RpcNotification {
    /// Create a notification stamped with the current UTC time.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}
