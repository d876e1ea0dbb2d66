//! RPC error types.
//!
//! Typed error hierarchy for controller and provider responses. Each error
//! carries a machine-readable code.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Error codes
// ─────────────────────────────────────────────────────────────────────────────

/// Centralized RPC error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorCode {
    // Core
    /// Invalid parameters.
    #[serde(rename = "INVALID_PARAMS")]
    InvalidParams,
    /// Internal error.
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    /// Method not found.
    #[serde(rename = "METHOD_NOT_FOUND")]
    MethodNotFound,
    /// Resource not found.
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    /// Request is well-formed but cannot be served in the current state.
    #[serde(rename = "INVALID_REQUEST")]
    InvalidRequest,

    // Connection
    /// No live network connection.
    #[serde(rename = "NOT_INITIALIZED")]
    NotInitialized,
    /// Transport construction failed during a network switch.
    #[serde(rename = "CONNECTION_FAILED")]
    ConnectionFailed,

    // Accounts
    /// No active wallet subscription for the address.
    #[serde(rename = "NO_SUBSCRIPTION")]
    NoSubscription,
    /// Pending request invalidated by stop, log out, or network switch.
    #[serde(rename = "SUPERSEDED")]
    Superseded,
    /// Pending request explicitly rejected.
    #[serde(rename = "REJECTED")]
    Rejected,
    /// Message expired before confirmation.
    #[serde(rename = "MESSAGE_EXPIRED")]
    MessageExpired,
    /// Wallet engine failure.
    #[serde(rename = "ENGINE_FAILURE")]
    EngineFailure,
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_else(|_| "UNKNOWN".to_owned());
        // Strip surrounding quotes
        write!(f, "{}", s.trim_matches('"'))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC error
// ─────────────────────────────────────────────────────────────────────────────

/// Base RPC error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// Machine-readable error code.
    pub code: RpcErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Serializable error body sent back to a browser context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code.
    pub code: RpcErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Create a new RPC error.
    #[must_use]
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid parameters.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    /// Method not found.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            RpcErrorCode::MethodNotFound,
            format!("Method '{method}' not found"),
        )
    }

    /// Internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    /// Machine-readable code as a string.
    #[must_use]
    pub fn code_str(&self) -> String {
        self.code.to_string()
    }

    /// Wire body for this error.
    #[must_use]
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code,
            message: self.message.clone(),
        }
    }
}
