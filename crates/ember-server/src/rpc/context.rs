//! Shared state handed to every RPC handler.

use std::sync::Arc;

use crate::controller::WalletController;

/// Context passed to [`MethodHandler::handle`](super::registry::MethodHandler::handle).
#[derive(Clone)]
pub struct RpcContext {
    /// The top-level wallet controller.
    pub controller: Arc<WalletController>,
}
