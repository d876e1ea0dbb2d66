//! # ember-core
//!
//! Foundation types, errors, branded IDs, and logging for the ember wallet
//! session core.
//!
//! This crate provides the shared vocabulary that all other ember crates depend on:
//!
//! - **Branded IDs**: `ConnectionId`, `SubscriptionId`, `MessageId` as newtypes for type safety
//! - **Network model**: `NetworkConfig`, `ConnectionKind`, and the built-in presets
//! - **Wallet model**: account entries, contract state, transactions, signed messages
//! - **Errors**: wire-level `RpcError` / `RpcErrorCode`
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod models;

pub use errors::{RpcError, RpcErrorCode};
pub use ids::{ConnectionId, MessageId, SubscriptionId};
