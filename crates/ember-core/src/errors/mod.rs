//! Error types shared across crates.
//!
//! Domain errors live with the crate that raises them (`EngineError`,
//! `ConnectionError`, `AccountError`). Each of them converts into the
//! wire-level [`RpcError`] defined in [`rpc`], which is what browser
//! contexts receive.

pub mod rpc;

pub use rpc::{RpcError, RpcErrorBody, RpcErrorCode};
