//! Runtime error types.

use ember_core::errors::{RpcError, RpcErrorCode};
use ember_engine::{EngineError, TransportError};

/// Errors raised by the connection controller.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No connection is live.
    #[error("Connection is not initialized")]
    NotInitialized,

    /// Building the transport for the new network failed. No connection is
    /// live afterwards.
    #[error("Failed to connect to {network}: {source}")]
    ConnectionFailed {
        /// Target network name.
        network: String,
        /// Transport error.
        #[source]
        source: TransportError,
    },

    /// `initial_sync` was already called.
    #[error("Connection controller is already initialized")]
    AlreadyInitialized,
}

impl ConnectionError {
    /// Whether a later call can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotInitialized | Self::ConnectionFailed { .. } => true,
            Self::AlreadyInitialized => false,
        }
    }
}

impl From<ConnectionError> for RpcError {
    fn from(err: ConnectionError) -> Self {
        let code = match &err {
            ConnectionError::NotInitialized => RpcErrorCode::NotInitialized,
            ConnectionError::ConnectionFailed { .. } => RpcErrorCode::ConnectionFailed,
            ConnectionError::AlreadyInitialized => RpcErrorCode::InvalidRequest,
        };
        Self::new(code, err.to_string())
    }
}

/// Errors raised by the account controller.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The address has no active wallet subscription.
    #[error("There is no subscription for address {0}")]
    NoSubscription(String),

    /// The pending request was invalidated by stop, log out, or a network
    /// switch.
    #[error("The request was rejected; please try again")]
    Superseded,

    /// The pending request was rejected, usually because submission failed.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The engine reported the message as expired.
    #[error("Message expired")]
    Expired,

    /// A message with the same id is already pending for the address.
    #[error("Message {message_id} is already pending for {address}")]
    MessageAlreadyPending {
        /// Wallet address.
        address: String,
        /// Message content id.
        message_id: String,
    },

    /// The wallet contract must be deployed first.
    #[error("Contract must be deployed first")]
    ContractNotDeployed,

    /// No contract state is known yet for the address.
    #[error("Failed to get contract state for {0}")]
    StateUnavailable(String),

    /// Key or account storage failed.
    #[error("Storage error: {0}")]
    Storage(#[source] EngineError),

    /// Wallet engine failure, with the engine's message.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Connection controller failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl AccountError {
    /// Whether a later call can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Engine(EngineError::InvalidPassword) => false,
            Self::MessageAlreadyPending { .. } | Self::ContractNotDeployed => false,
            Self::NoSubscription(_)
            | Self::Superseded
            | Self::Rejected(_)
            | Self::Expired
            | Self::StateUnavailable(_)
            | Self::Storage(_)
            | Self::Engine(_) => true,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoSubscription(_) => "no_subscription",
            Self::Superseded => "superseded",
            Self::Rejected(_) => "rejected",
            Self::Expired => "expired",
            Self::MessageAlreadyPending { .. } => "already_pending",
            Self::ContractNotDeployed => "not_deployed",
            Self::StateUnavailable(_) => "state_unavailable",
            Self::Storage(_) => "storage",
            Self::Engine(_) => "engine",
            Self::Connection(_) => "connection",
        }
    }
}

impl From<AccountError> for RpcError {
    fn from(err: AccountError) -> Self {
        let code = match &err {
            AccountError::Connection(ConnectionError::NotInitialized) => {
                RpcErrorCode::NotInitialized
            }
            AccountError::Connection(ConnectionError::ConnectionFailed { .. }) => {
                RpcErrorCode::ConnectionFailed
            }
            AccountError::Connection(ConnectionError::AlreadyInitialized) => {
                RpcErrorCode::InvalidRequest
            }
            AccountError::NoSubscription(_) => RpcErrorCode::NoSubscription,
            AccountError::Superseded => RpcErrorCode::Superseded,
            AccountError::Rejected(_) => RpcErrorCode::Rejected,
            AccountError::Expired => RpcErrorCode::MessageExpired,
            AccountError::MessageAlreadyPending { .. } | AccountError::ContractNotDeployed => {
                RpcErrorCode::InvalidRequest
            }
            AccountError::StateUnavailable(_) => RpcErrorCode::NotFound,
            AccountError::Engine(EngineError::InvalidPassword) => RpcErrorCode::InvalidParams,
            AccountError::Engine(_) => RpcErrorCode::EngineFailure,
            AccountError::Storage(_) => RpcErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}
