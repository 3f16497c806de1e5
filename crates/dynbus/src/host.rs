//! # Object Host
//!
//! The callee's side of an endpoint. The host owns the live objects it has
//! handed out and answers inbound requests against them.
//!
//! ## Dispatch
//!
//! For each inbound message:
//! 1. Reference tuples among the params are resolved against the registry.
//! 2. A built-in or registered handler with the message's method name is
//!    called with all params.
//! 3. Otherwise the first param is the target (`null` or absent means the
//!    root object) and the remaining params go to the target's own operation.
//! 4. The result is marshaled: live objects become references, data is copied.
//!
//! Any failure of a request becomes an error response with code `-32603`.
//! A failed notification is only logged.
//!
//! ## Invariants
//!
//! - Locks on the registry and tables are never held across an `.await`.
//! - Messages of one body are handled in order; the replies keep that order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use dynwire::Body;
use dynwire::ErrorObject;
use dynwire::Json;
use dynwire::Message;
use dynwire::MessageKind;
use dynwire::control;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::class;
use crate::class::ClassDef;
use crate::class::Ledger;
use crate::error::ErrorKind;
use crate::marshal;
use crate::marshal::Registry;
use crate::object;
use crate::object::LiveObject;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Marshal(marshal::Error),
    /// The target does not expose an operation with this name.
    MethodNotFound { target: String, method: String },
    /// A handler or a target operation failed.
    Object(object::Error),
    Class(class::Error),
    /// The request addressed the root, and no root object is set.
    NoRoot,
    /// The target param is data, not an object.
    NotAnObject(String),
    BadArguments(String),
    /// Built-in names cannot be claimed by application handlers.
    ReservedMethod(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Marshal(e) => e.kind(),
            Self::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            Self::Object(e) => e.kind(),
            Self::Class(class::Error::Constructor(e)) => e.kind(),
            Self::Class(_) => ErrorKind::DispatchFailure,
            Self::NoRoot => ErrorKind::UnknownReference,
            Self::NotAnObject(_) | Self::BadArguments(_) => ErrorKind::DispatchFailure,
            Self::ReservedMethod(_) => ErrorKind::RegistrationConflict,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marshal(e) => write!(f, "{}", e),
            Self::MethodNotFound { target, method } => {
                write!(f, "Method not found: {} on {}", method, target)
            }
            Self::Object(e) => write!(f, "{}", e),
            Self::Class(e) => write!(f, "{}", e),
            Self::NoRoot => write!(f, "No root object is set"),
            Self::NotAnObject(what) => write!(f, "Target is not an object: {}", what),
            Self::BadArguments(msg) => write!(f, "Bad arguments: {}", msg),
            Self::ReservedMethod(name) => write!(f, "Method name is reserved: {}", name),
        }
    }
}

impl std::error::Error for Error {}

impl From<marshal::Error> for Error {
    fn from(e: marshal::Error) -> Self {
        Self::Marshal(e)
    }
}

impl From<object::Error> for Error {
    fn from(e: object::Error) -> Self {
        Self::Object(e)
    }
}

impl From<class::Error> for Error {
    fn from(e: class::Error) -> Self {
        Self::Class(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An application handler registered under a method name.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, object::Result<Value>> + Send + Sync>;

/// Serves the live objects of one endpoint.
pub struct ObjectHost {
    name: String,
    registry: Mutex<Registry>,
    methods: RwLock<HashMap<String, Handler>>,
    classes: RwLock<Ledger>,
    root: RwLock<Option<LiveObject>>,
}

impl ObjectHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Mutex::new(Registry::new()),
            methods: RwLock::new(HashMap::new()),
            classes: RwLock::new(Ledger::new()),
            root: RwLock::new(None),
        }
    }

    /// Endpoint name the host is reachable under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs a handler, replacing any previous handler with the same name.
    pub fn register_method<F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = object::Result<Value>> + Send + 'static,
    {
        let name = name.into();
        if control::is_builtin(&name) {
            return Err(Error::ReservedMethod(name));
        }
        let handler: Handler = Arc::new(move |args| handler(args).boxed());
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, handler);
        Ok(())
    }

    /// Sets the object that requests with a `null` target address.
    pub fn set_root(&self, root: impl Into<LiveObject>) {
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = Some(root.into());
    }

    pub fn register_class(&self, class: ClassDef) {
        tracing::debug!(endpoint = %self.name, class = %class.name(), "class registered");
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class);
    }

    /// Marshals a value as a result from this host would be.
    pub fn marshal(&self, value: Value) -> marshal::Result<Json> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        marshal::marshal_result(&mut registry, value)
    }

    /// Looks up a live object by id.
    pub fn resolve(&self, id: u64) -> Option<LiveObject> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).resolve(id)
    }

    /// Number of live objects handed out so far.
    pub fn registered_objects(&self) -> usize {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handles every message of an inbound body in order.
    ///
    /// Returns the replies packed the way the body was: none, a single
    /// message, or a batch.
    pub async fn on_receive(&self, source: Option<&str>, body: Body) -> Option<Body> {
        let mut replies = Vec::new();
        for message in body.into_messages() {
            if let Some(reply) = self.dispatch(source, message).await {
                replies.push(reply);
            }
        }
        Body::from_messages(replies)
    }

    /// Handles one message. Returns the response, if one is owed.
    pub async fn dispatch(&self, source: Option<&str>, mut message: Message) -> Option<Message> {
        let source = source.unwrap_or("<unknown>");
        match message.kind() {
            MessageKind::Request | MessageKind::Notification => {}
            MessageKind::Response => {
                tracing::warn!(endpoint = %self.name, source, "host received a response, dropped");
                return None;
            }
            MessageKind::Malformed => {
                let reason = match &message.invalid {
                    Some(invalid) => format!("Malformed message: {}", invalid.reason),
                    None => "Malformed message".to_string(),
                };
                tracing::warn!(endpoint = %self.name, source, "{}: {:?}", reason, message);
                return message.id.map(|id| Message::err(id, ErrorObject::internal(reason)));
            }
        }

        let id = message.id;
        let method = message.method.take().unwrap_or_default();
        let params = message.take_params();

        let outcome = self.invoke(&method, params).await;
        match (id, outcome) {
            (Some(id), Ok(result)) => Some(Message::ok(id, result)),
            (Some(id), Err(e)) => {
                tracing::debug!(endpoint = %self.name, source, id, method = %method, kind = %e.kind(), "request failed: {}", e);
                Some(Message::err(id, ErrorObject::internal(e.to_string())))
            }
            (None, Ok(_)) => None,
            (None, Err(e)) => {
                tracing::warn!(endpoint = %self.name, source, method = %method, kind = %e.kind(), "notification failed: {}", e);
                None
            }
        }
    }

    async fn invoke(&self, method: &str, params: Vec<Json>) -> Result<Json> {
        let params = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            marshal::unmarshal_params(&registry, params)?
        };
        let value = self.call(method, params).await?;
        Ok(self.marshal(value)?)
    }

    async fn call(&self, method: &str, mut params: Vec<Value>) -> Result<Value> {
        match method {
            control::GETTER => return self.getter(params),
            control::NEW => return self.construct(params),
            control::INSPECT => return self.inspect(params),
            control::ROOT => return self.root().map(Value::Object),
            _ => {}
        }

        let handler = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();
        if let Some(handler) = handler {
            return Ok(handler(params).await?);
        }

        let target = if params.is_empty() {
            self.root()?
        } else {
            self.target(params.remove(0))?
        };

        target.call(method, params).await.map_err(|e| match e {
            object::Error::MethodNotFound(method) => Error::MethodNotFound {
                target: target.class_name().to_string(),
                method,
            },
            other => Error::Object(other),
        })
    }

    fn root(&self) -> Result<LiveObject> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NoRoot)
    }

    fn target(&self, value: Value) -> Result<LiveObject> {
        match value {
            Value::Object(object) => Ok(object),
            Value::Data(Json::Null) => self.root(),
            other => Err(Error::NotAnObject(other.describe())),
        }
    }

    /// `__getter__(target, name)`
    fn getter(&self, mut params: Vec<Value>) -> Result<Value> {
        if params.len() != 2 {
            return Err(Error::BadArguments(format!(
                "{} expects a target and a property name",
                control::GETTER
            )));
        }
        let name = params.pop().unwrap_or_default();
        let Some(name) = name.as_str() else {
            return Err(Error::BadArguments(format!(
                "property name must be a string, got {}",
                name.describe()
            )));
        };
        let target = self.target(params.pop().unwrap_or_default())?;
        target
            .get(name)
            .ok_or_else(|| Error::Object(object::Error::PropertyNotFound(name.to_string())))
    }

    /// `__new__(class, ...args)`
    fn construct(&self, mut params: Vec<Value>) -> Result<Value> {
        let class = match params.first().and_then(Value::as_str) {
            Some(class) => class.to_string(),
            None => {
                return Err(Error::BadArguments(format!(
                    "{} expects a class name",
                    control::NEW
                )));
            }
        };
        params.remove(0);

        let constructor = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .constructor(&class)?;
        let object = constructor(params).map_err(class::Error::Constructor)?;
        Ok(Value::Object(object))
    }

    /// `__inspect__(class)`
    fn inspect(&self, params: Vec<Value>) -> Result<Value> {
        let Some(class) = params.first().and_then(Value::as_str) else {
            return Err(Error::BadArguments(format!(
                "{} expects a class name",
                control::INSPECT
            )));
        };
        let info = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .inspect(class);
        match info {
            Some(info) => serde_json::to_value(info)
                .map(Value::Data)
                .map_err(|e| Error::Object(object::Error::failed(e.to_string()))),
            None => Ok(Value::null()),
        }
    }
}

impl std::fmt::Debug for ObjectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHost")
            .field("name", &self.name)
            .field("objects", &self.registered_objects())
            .finish()
    }
}
