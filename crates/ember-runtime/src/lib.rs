//! # ember-runtime
//!
//! Session coordination core of the wallet.
//!
//! - **Connection controller**: owns the single live network connection,
//!   hands out scoped leases, and arbitrates switching it
//! - **Wallet subscriptions**: supervised polling loops, one per tracked
//!   wallet, reporting typed events over a channel
//! - **Account controller**: starts/stops subscriptions under one mutex,
//!   correlates sent messages with their confirmation or expiry, and merges
//!   observed state into [`AccountState`]
//! - **Notifications**: user-facing summaries of newly found transactions

#![deny(unsafe_code)]

pub mod account;
pub mod connection;
pub mod errors;
pub mod notifications;
pub mod subscription;

pub use account::{AccountController, AccountDeps, AccountEvent, AccountState, PendingMessage};
pub use connection::{
    ConnectionController, ConnectionLease, InitializedConnection, NetworkSwitchHandle,
};
pub use errors::{AccountError, ConnectionError};
pub use notifications::{Notifier, TracingNotifier};
pub use subscription::{TokenWalletSubscription, TonWalletSubscription};
