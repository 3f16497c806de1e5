//! # Control and Built-in Method Names
//!
//! Control methods are addressed to the relay (`to: null`). Built-in methods
//! are served by every object host and cannot be shadowed by application
//! handlers.

use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::frame::Message;
use crate::frame::MessageKind;

/// Binds the sending channel to a well-known endpoint name.
pub const LISTEN: &str = "__listen__";
/// Older spelling of [`LISTEN`], accepted by the relay.
pub const REGISTER: &str = "__register__";
/// Binds the sending channel to a relay-generated name, pinned to one peer.
pub const CONNECT: &str = "__connect__";

/// Reads a named property off a target.
pub const GETTER: &str = "__getter__";
/// Constructs an instance of a named class.
pub const NEW: &str = "__new__";
/// Describes a class: parent, methods and properties.
pub const INSPECT: &str = "__inspect__";
/// Returns the host's root object.
pub const ROOT: &str = "__root__";

/// Names no application handler may claim.
pub const BUILTINS: [&str; 4] = [GETTER, NEW, INSPECT, ROOT];

/// Returns true for the names reserved by built-in host methods.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// A decoded control operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Claim `name` for the sending channel.
    Listen(String),
    /// Obtain an anonymous name and pin the channel to `remote`.
    Connect(String),
}

impl ControlRequest {
    /// Builds the wire message for this control operation.
    pub fn to_message(&self) -> Message {
        match self {
            Self::Listen(name) => Message::notification(LISTEN, vec![Value::String(name.clone())]),
            Self::Connect(remote) => Message::notification(CONNECT, vec![Value::String(remote.clone())]),
        }
    }

    /// Parses a control message.
    ///
    /// Control messages are notifications; carrying an `id` is a violation,
    /// since the relay never replies.
    pub fn from_message(message: &Message) -> Result<Self> {
        if message.kind() != MessageKind::Notification {
            return Err(Error::ProtocolViolation(
                "control messages must be notifications without an id".into(),
            ));
        }

        let method = message.method.as_deref().unwrap_or_default();
        let name = match message.params.as_deref() {
            Some([Value::String(name)]) => name.clone(),
            _ => {
                return Err(Error::ProtocolViolation(format!(
                    "{} expects exactly one string parameter",
                    method
                )));
            }
        };

        match method {
            LISTEN | REGISTER => Ok(Self::Listen(name)),
            CONNECT => Ok(Self::Connect(name)),
            other => Err(Error::ProtocolViolation(format!("Unknown control method: {}", other))),
        }
    }
}
