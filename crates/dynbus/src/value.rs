//! Values as seen by application code on either side of the bus.
//!
//! On the wire everything is JSON. In process, a value is plain data, a live
//! object owned by the local host, or a proxy to an object owned by a remote
//! host. Live objects and proxies only ever appear at the top level: plain data
//! cannot contain them, so an object can never be silently copied by value
//! inside an array.

use dynwire::Json;

use crate::object::Exposed;
use crate::object::LiveObject;
use crate::proxy::ObjectProxy;

#[derive(Clone)]
pub enum Value {
    /// Copied by value: null, booleans, numbers, strings, arrays, maps.
    Data(Json),
    /// A local object, sent as a reference.
    Object(LiveObject),
    /// A handle to an object owned by a remote host.
    Proxy(ObjectProxy),
}

impl Value {
    pub fn null() -> Self {
        Self::Data(Json::Null)
    }

    /// Wraps an exposable object in a fresh live handle.
    pub fn object(object: impl Exposed) -> Self {
        Self::Object(LiveObject::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(Json::Null))
    }

    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&LiveObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ObjectProxy> {
        match self {
            Self::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<ObjectProxy> {
        match self {
            Self::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Json::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(Json::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_data().and_then(Json::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(Json::as_bool)
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Data(Json::Null) => "null".into(),
            Self::Data(Json::Bool(_)) => "boolean".into(),
            Self::Data(Json::Number(_)) => "number".into(),
            Self::Data(Json::String(_)) => "string".into(),
            Self::Data(Json::Array(_)) => "array".into(),
            Self::Data(Json::Object(_)) => "plain map".into(),
            Self::Object(object) => format!("object of class {}", object.class_name()),
            Self::Proxy(proxy) => format!("proxy to {}", proxy),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Proxy(a), Self::Proxy(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(json) => write!(f, "Data({})", json),
            Self::Object(object) => write!(f, "{:?}", object),
            Self::Proxy(proxy) => write!(f, "{:?}", proxy),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Data(json)
    }
}

impl From<LiveObject> for Value {
    fn from(object: LiveObject) -> Self {
        Self::Object(object)
    }
}

impl From<ObjectProxy> for Value {
    fn from(proxy: ObjectProxy) -> Self {
        Self::Proxy(proxy)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Data(Json::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Data(Json::String(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Data(Json::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Data(Json::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Data(Json::from(n))
    }
}
