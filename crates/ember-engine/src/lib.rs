//! # ember-engine
//!
//! Capability API consumed by the session core.
//!
//! The wallet engine (key management, signing, contract-state computation),
//! the network transport, and persistent storage are external collaborators.
//! This crate describes them as traits so the runtime can be driven by the
//! real engine in production and by in-memory doubles in tests:
//!
//! - [`transport`]: `Transport` / `TransportFactory` and the HTTP implementation
//! - [`wallet`]: `WalletEngine`, `TonWallet`, `TokenWallet`, and their event types
//! - [`storage`]: `KeyStore`, `AccountsStorage`, `KeyValueStore`
//! - [`merge`]: ordered, deduplicating transaction batch merge
//! - `testing` (feature `testing`): in-memory doubles

#![deny(unsafe_code)]

pub mod errors;
pub mod merge;
pub mod storage;
pub mod transport;
pub mod wallet;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{EngineError, TransportError};
pub use merge::merge_transactions;
pub use storage::{AccountsStorage, KeyStore, KeyValueStore};
pub use transport::{HttpTransport, HttpTransportFactory, Transport, TransportFactory};
pub use wallet::{
    TokenWallet, TokenWalletEvent, TonWallet, TonWalletEvent, UnsignedMessage, WalletEngine,
};
