//! # Exposable Objects
//!
//! A host can only vend objects whose type implements [`Exposed`]. The trait is
//! the object's capability set: the names it answers to as operations and as
//! properties. Dispatch looks a name up in that set and reports
//! `MethodNotFound` when it is absent; there is no reflection over arbitrary
//! Rust values.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::value::Value;

/// Failures raised by an exposed object's own operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The object has no operation with this name.
    MethodNotFound(String),
    /// The object has no property with this name.
    PropertyNotFound(String),
    /// The arguments do not fit the operation.
    BadArguments(String),
    /// The operation ran and failed.
    Failed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MethodNotFound(_) | Self::PropertyNotFound(_) => ErrorKind::MethodNotFound,
            Self::BadArguments(_) | Self::Failed(_) => ErrorKind::DispatchFailure,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MethodNotFound(name) => write!(f, "Method not found: {}", name),
            Self::PropertyNotFound(name) => write!(f, "Property not found: {}", name),
            Self::BadArguments(msg) => write!(f, "Bad arguments: {}", msg),
            Self::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// An in-process object that remote callers may address by reference.
///
/// Implementations must be cheap to share: the host keeps them behind an
/// `Arc` for its whole lifetime.
#[async_trait::async_trait]
pub trait Exposed: Send + Sync + 'static {
    /// Runtime class name, sent alongside the id in every reference.
    fn class_name(&self) -> &str;

    /// Reads a property. `None` means the object has no such property.
    fn get(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Invokes a named operation with positional arguments.
    ///
    /// The default exposes no operations at all.
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let _ = args;
        Err(Error::MethodNotFound(method.to_string()))
    }
}

/// Shared handle to an exposed object.
///
/// Identity is the identity of the allocation: two handles are the same
/// object exactly when they point at the same `Arc`.
#[derive(Clone)]
pub struct LiveObject(Arc<dyn Exposed>);

impl LiveObject {
    pub fn new(object: impl Exposed) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn Exposed>) -> Self {
        Self(object)
    }

    pub fn class_name(&self) -> &str {
        self.0.class_name()
    }

    /// Returns true if both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &LiveObject) -> bool {
        self.identity() == other.identity()
    }

    /// Address of the shared allocation.
    ///
    /// Stable for as long as any handle is alive; the registry keeps one alive
    /// forever, so an address it has seen is never reused for another object.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::ops::Deref for LiveObject {
    type Target = dyn Exposed;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for LiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LiveObject({} @ {:#x})", self.class_name(), self.identity())
    }
}

impl<T: Exposed> From<Arc<T>> for LiveObject {
    fn from(object: Arc<T>) -> Self {
        Self(object)
    }
}

/// A plain property bag exposed by reference.
///
/// The equivalent of handing out an ordinary object literal: readable
/// properties, no operations. Properties may themselves hold live objects,
/// which is how object graphs (a root holding a `document` holding a `body`)
/// are built.
#[derive(Debug, Clone)]
pub struct Record {
    class: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// An empty record reporting class `Object`.
    pub fn new() -> Self {
        Self::with_class("Object")
    }

    pub fn with_class(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds or replaces a property.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn into_live(self) -> LiveObject {
        LiveObject::new(self)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Exposed for Record {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}
