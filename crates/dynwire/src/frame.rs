//! # Protocol Frames
//!
//! Defines the envelope and the messages it carries.
//!
//! ## Invariants
//! - **Presence matters**: `"result": null` is a successful response carrying
//!   null, and is distinct from a message with no `result` member at all.
//! - **Forward Compatibility**: Unknown members (e.g. a `jsonrpc` version tag)
//!   are ignored when decoding.
//! - **Isolation**: each message of a body decodes on its own. An element that
//!   does not fit the message shape becomes a [`MessageKind::Malformed`]
//!   message carrying its raw JSON, and its siblings are unaffected.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;

use crate::error::ErrorObject;

/// The unit of transmission between an endpoint and the relay.
///
/// `to == None` addresses the relay itself (control operations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub body: Body,
}

impl Envelope {
    pub fn new(to: Option<String>, from: Option<String>, body: Body) -> Self {
        Self { to, from, body }
    }

    /// Builds an envelope addressed to the relay.
    pub fn control(from: Option<String>, message: Message) -> Self {
        Self { to: None, from, body: Body::Single(message) }
    }

    /// Returns true if this envelope is addressed to the relay itself.
    pub fn is_control(&self) -> bool {
        self.to.is_none()
    }
}

/// One message or a batch of messages.
///
/// Each message in a batch is processed independently.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Batch(Vec<Message>),
    Single(Message),
}

impl Body {
    /// Packs messages into the smallest body: a single message stays single.
    ///
    /// Returns `None` for an empty list; there is nothing to send.
    pub fn from_messages(mut messages: Vec<Message>) -> Option<Self> {
        match messages.len() {
            0 => None,
            1 => messages.pop().map(Body::Single),
            _ => Some(Body::Batch(messages)),
        }
    }

    /// Normalizes the body to a sequence of messages.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Body::Batch(messages) => messages,
            Body::Single(message) => vec![message],
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Body::Batch(messages) => messages,
            Body::Single(message) => std::slice::from_ref(message),
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Body::Single(message) => message.wire().serialize(serializer),
            Body::Batch(messages) => serializer.collect_seq(messages.iter().map(Message::wire)),
        }
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => Body::Batch(items.into_iter().map(Message::from_json).collect()),
            other => Body::Single(Message::from_json(other)),
        })
    }
}

impl From<Message> for Body {
    fn from(message: Message) -> Self {
        Body::Single(message)
    }
}

/// A request, notification, or response.
///
/// Exactly one of `method` (request) or `result`/`error` (response) is
/// populated on a well-formed message; see [`Message::kind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Set when the element could not be decoded as a message.
    #[serde(skip)]
    pub invalid: Option<Invalid>,
}

/// An element of a body that did not decode as a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Invalid {
    /// The element exactly as received. Re-encoding a body emits this.
    pub raw: Value,
    pub reason: String,
}

impl Invalid {
    /// Whether the element was meant as a response.
    pub fn looks_like_response(&self) -> bool {
        self.raw.get("result").is_some() || self.raw.get("error").is_some()
    }
}

/// What a message serializes as inside a body.
#[derive(Serialize)]
#[serde(untagged)]
enum Wire<'a> {
    Raw(&'a Value),
    Decoded(&'a Message),
}

/// Classification of a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has a method and an id; a response is expected.
    Request,
    /// Has a method and no id; fire-and-forget.
    Notification,
    /// Has an id and exactly one of result/error.
    Response,
    /// Anything else.
    Malformed,
}

impl Message {
    /// A request expecting a response correlated by `id`.
    pub fn request(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params: Some(params),
            ..Self::default()
        }
    }

    /// A request without an id. No response will be sent.
    pub fn notification(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
            ..Self::default()
        }
    }

    /// A successful response.
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Self::default()
        }
    }

    /// A failed response.
    pub fn err(id: u64, error: ErrorObject) -> Self {
        Self {
            id: Some(id),
            error: Some(error),
            ..Self::default()
        }
    }

    /// Decodes one body element. Never fails: an element that does not fit
    /// the message shape comes back [`MessageKind::Malformed`], keeping its
    /// `id` when that is readable.
    pub fn from_json(value: Value) -> Self {
        match serde_json::from_value::<Message>(value.clone()) {
            Ok(message) => message,
            Err(e) => Self {
                id: value.get("id").and_then(Value::as_u64),
                invalid: Some(Invalid { raw: value, reason: e.to_string() }),
                ..Self::default()
            },
        }
    }

    fn wire(&self) -> Wire<'_> {
        match &self.invalid {
            Some(invalid) => Wire::Raw(&invalid.raw),
            None => Wire::Decoded(self),
        }
    }

    pub fn kind(&self) -> MessageKind {
        if self.invalid.is_some() {
            return MessageKind::Malformed;
        }
        let has_method = self.method.is_some();
        let has_result = self.result.is_some();
        let has_error = self.error.is_some();

        match (has_method, has_result, has_error) {
            (true, false, false) if self.id.is_some() => MessageKind::Request,
            (true, false, false) => MessageKind::Notification,
            (false, true, false) | (false, false, true) if self.id.is_some() => MessageKind::Response,
            _ => MessageKind::Malformed,
        }
    }

    /// True if this message carries `result` or `error`.
    ///
    /// The router uses this to decide between the host and a stub, so it is
    /// deliberately looser than `kind() == Response`.
    pub fn is_response(&self) -> bool {
        match &self.invalid {
            Some(invalid) => invalid.looks_like_response(),
            None => self.result.is_some() || self.error.is_some(),
        }
    }

    /// Takes the params, treating an absent member as an empty list.
    pub fn take_params(&mut self) -> Vec<Value> {
        self.params.take().unwrap_or_default()
    }
}

/// Deserializes a member that is present, keeping an explicit `null` as `Some(Null)`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
