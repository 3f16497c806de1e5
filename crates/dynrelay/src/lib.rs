//! # dynrelay
//!
//! The hub every dynbus endpoint connects to.
//!
//! ## Architecture
//!
//! - Each attached transport is served by its own task.
//! - An envelope with `to: null` is a control operation. `__listen__` binds
//!   the connection to a name. `__connect__` binds it to a generated name and
//!   pins it to one destination.
//! - Any other envelope is stamped with the sender's bound name and forwarded
//!   to the connection bound to `to`.
//!
//! The relay never looks inside message bodies beyond control operations,
//! and never replies. Traffic it cannot route is logged and dropped.

pub mod config;
pub mod relay;

pub use config::RelayConfig;
pub use relay::ConnectionId;
pub use relay::Relay;

#[cfg(test)]
mod tests;
