//! # Envelope Codec
//!
//! Envelopes travel as UTF-8 JSON text. The transport moves the bytes; this
//! module is the only place they are interpreted.

use crate::error::Result;
use crate::frame::Envelope;

/// Serializes an envelope to UTF-8 JSON bytes.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Parses UTF-8 JSON bytes into an envelope.
///
/// Individual messages are not validated here; callers classify each one
/// with [`crate::Message::kind`] so that one bad message in a batch does not
/// poison the rest.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    Ok(serde_json::from_slice(bytes)?)
}
