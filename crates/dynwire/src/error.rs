//! # Error Definitions
//!
//! Codec failures on our side, and the `error` object carried inside a
//! response message on the wire.

use serde::Deserialize;
use serde::Serialize;

/// Catch-all code for dispatch and marshal failures on the remote host.
pub const INTERNAL_ERROR: i64 = -32603;

/// Code used for envelopes the relay refuses to route.
pub const INVALID_REQUEST: i64 = -32600;

/// Failures while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The payload was not valid JSON, or did not match the envelope shape.
    Json(String),
    /// The payload decoded but breaks a protocol rule (e.g. unknown control method).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "Malformed JSON frame: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// An internal error (`-32603`) with the given description.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
