//! # Transport Abstraction
//!
//! A minimal, async interface for moving framed bytes between an endpoint and
//! the relay.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about envelopes, messages, or
//!   references. It moves opaque UTF-8 payloads.
//! - **Duplex**: Sending and receiving are independent. Request/response pairing
//!   is built on top of this, not defined here.

use crate::error::ErrorKind;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The transport was closed locally.
    Closed,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportFailure
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Closed => write!(f, "Transport closed"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// An ordered, reliable, message-framed duplex channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one framed payload.
    ///
    /// # invariants
    /// - Must not interpret the payload content (e.g. no JSON parsing).
    /// - Must return `Err` once the channel is closed.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next framed payload.
    ///
    /// Returns `Ok(None)` once the channel is closed by either side.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Closes the channel. Pending and future `recv` calls return `Ok(None)`.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
