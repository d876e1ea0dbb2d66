//! # ember-server
//!
//! The outer layer of the wallet session core:
//!
//! - [`registry`]: attached browser contexts indexed by origin and tab, and
//!   the notify-by-scope primitives
//! - [`controller`]: the top-level [`WalletController`] wiring the connection
//!   and account controllers to the registry
//! - [`rpc`]: the controller method registry exposed to trusted UI surfaces

#![deny(unsafe_code)]

pub mod controller;
pub mod registry;
pub mod rpc;

pub use controller::{ControllerState, WalletController, WalletDeps};
pub use registry::{ClientConnection, ConnectionRegistry};
