//! Errors surfaced by the engine and transport capabilities.

/// Failure of a single transport exchange or of transport construction.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        message: String,
    },

    /// Endpoint URL could not be used.
    #[error("invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The configured endpoint.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    /// The transport was shut down.
    #[error("transport is closed")]
    Closed,

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidEndpoint { .. } | Self::Closed | Self::Other(_) => false,
        }
    }
}

/// Failure reported by the wallet engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The underlying transport failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The contract is not deployed, so a transfer cannot be prepared.
    #[error("contract must be deployed first")]
    ContractNotDeployed,

    /// The key password did not match.
    #[error("invalid password")]
    InvalidPassword,

    /// No key with the given public key exists.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// No account with the given address exists.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Persistent storage failed.
    #[error("storage: {0}")]
    Storage(String),

    /// Response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Any other engine failure, with the engine's message.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::ContractNotDeployed => "contract",
            Self::InvalidPassword | Self::KeyNotFound(_) => "keystore",
            Self::AccountNotFound(_) | Self::Storage(_) => "storage",
            Self::Malformed(_) => "parse",
            Self::Other(_) => "engine",
        }
    }
}
