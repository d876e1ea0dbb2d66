//! Data model shared across the session core.
//!
//! All types use `#[serde(rename_all = "camelCase")]` so snapshots handed to
//! browser contexts match the extension's JSON wire format.

mod network;
mod transaction;
mod wallet;

pub use network::*;
pub use transaction::*;
pub use wallet::*;
