//! Controller RPC surface for trusted UI surfaces.

pub mod context;
pub mod handlers;
pub mod registry;
pub mod types;
