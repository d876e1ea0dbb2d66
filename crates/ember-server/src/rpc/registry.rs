//! Method registry and async dispatch.
//!
//! Handlers run to completion: `sendMessage` resolves only once the
//! message is confirmed or expires, so dispatch applies no deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ember_core::RpcError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Requests running longer than this are logged.
const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a request to the appropriate handler.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let method = request.method.as_str();
        let Some(handler) = self.handlers.get(method) else {
            warn!(method, "unknown RPC method");
            return RpcResponse::error(request.id, &RpcError::method_not_found(method));
        };

        let start = Instant::now();
        let response = match handler.handle(request.params, ctx).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(error) => {
                debug!(method, code = %error.code, "RPC request failed");
                RpcResponse::error(request.id, &error)
            }
        };

        let duration = start.elapsed();
        if duration >= SLOW_REQUEST {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }
        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
