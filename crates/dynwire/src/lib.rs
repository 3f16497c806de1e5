//! # dynwire
//!
//! The JSON wire protocol spoken between dynbus endpoints and the relay.
//!
//! ## Architecture
//!
//! - **Envelope**: `{ to, from, body }`, the unit handed to a transport.
//! - **Message**: a request, notification, or response. A body carries one
//!   message or a batch of them.
//! - **Reference**: the `{ class, id }` tuple that stands in for a live object.
//!
//! This crate performs no I/O and knows nothing about hosts or stubs. It only
//! defines shapes and the rules for classifying them.

pub mod codec;
pub mod control;
pub mod error;
pub mod frame;
pub mod reference;

pub use codec::decode_envelope;
pub use codec::encode_envelope;
pub use control::ControlRequest;
pub use error::ErrorObject;
pub use error::Error;
pub use error::Result;
pub use error::INTERNAL_ERROR;
pub use error::INVALID_REQUEST;
pub use frame::Body;
pub use frame::Envelope;
pub use frame::Invalid;
pub use frame::Message;
pub use frame::MessageKind;
pub use reference::Reference;

/// Re-exported so downstream crates agree on a single JSON value type.
pub use serde_json::Value as Json;
