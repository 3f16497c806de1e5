//! # Reference Marshaling
//!
//! Converts between in-process [`Value`]s and the JSON carried on the wire.
//!
//! ## Philosophy
//!
//! - **Objects by reference, data by value**: A live object crosses the wire as
//!   a `{class, id}` tuple; everything else is copied.
//! - **Side-table identity**: The registry remembers which allocation got which
//!   id. Objects are never tagged, so a handle the application holds is
//!   indistinguishable before and after it was marshaled.
//!
//! ## Invariants
//!
//! - Ids are assigned from 0 in first-marshal order and never reused.
//! - Marshaling the same object twice yields the same reference.
//! - A reference is only honoured by the host that issued it. Proxies are
//!   never forwarded to a third endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use dynwire::Json;
use dynwire::Reference;

use crate::error::ErrorKind;
use crate::object::LiveObject;
use crate::proxy::ObjectProxy;
use crate::stub::RemoteStub;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The id is not present in this host's registry.
    UnknownReference(Reference),
    /// A proxy was used where only the proxy's own endpoint could resolve it.
    ForeignReference(String),
    /// The value cannot be sent as a request parameter.
    UnsupportedParam(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownReference(_) => ErrorKind::UnknownReference,
            Self::ForeignReference(_) | Self::UnsupportedParam(_) => ErrorKind::DispatchFailure,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownReference(r) => write!(f, "Unknown reference: {}", r),
            Self::ForeignReference(msg) => write!(f, "Foreign reference: {}", msg),
            Self::UnsupportedParam(msg) => write!(f, "Unsupported parameter: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// The live objects one host has handed out.
#[derive(Debug, Default)]
pub struct Registry {
    objects: HashMap<u64, LiveObject>,
    identities: HashMap<usize, u64>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reference for an object, assigning the next id on first sight.
    pub fn intern(&mut self, object: &LiveObject) -> Reference {
        let identity = object.identity();
        let id = match self.identities.get(&identity) {
            Some(id) => *id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.identities.insert(identity, id);
                self.objects.insert(id, object.clone());
                id
            }
        };
        Reference::new(object.class_name(), id)
    }

    pub fn resolve(&self, id: u64) -> Option<LiveObject> {
        self.objects.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Host side: prepares a handler's return value for the wire.
pub fn marshal_result(registry: &mut Registry, value: Value) -> Result<Json> {
    match value {
        Value::Data(json) => Ok(json),
        Value::Object(object) => Ok(registry.intern(&object).to_json()),
        Value::Proxy(proxy) => Err(Error::ForeignReference(format!(
            "cannot return {} owned by '{}'",
            proxy,
            proxy.remote()
        ))),
    }
}

/// Host side: resolves the reference tuples among inbound parameters.
///
/// Only top-level parameters are inspected. A reference-shaped map nested in
/// an array or map stays plain data.
pub fn unmarshal_params(registry: &Registry, params: Vec<Json>) -> Result<Vec<Value>> {
    params
        .into_iter()
        .map(|param| match Reference::from_json(&param) {
            Some(reference) => registry
                .resolve(reference.id)
                .map(Value::Object)
                .ok_or(Error::UnknownReference(reference)),
            None => Ok(Value::Data(param)),
        })
        .collect()
}

/// Stub side: prepares outbound parameters for the host named `remote`.
pub fn marshal_params(remote: &str, params: Vec<Value>) -> Result<Vec<Json>> {
    params
        .into_iter()
        .map(|param| match param {
            Value::Data(json) => Ok(json),
            Value::Proxy(proxy) => marshal_proxy(remote, &proxy),
            Value::Object(object) => Err(Error::UnsupportedParam(format!(
                "local object of class {} cannot be passed to '{}'",
                object.class_name(),
                remote
            ))),
        })
        .collect()
}

fn marshal_proxy(remote: &str, proxy: &ObjectProxy) -> Result<Json> {
    if proxy.remote() != remote {
        return Err(Error::ForeignReference(format!(
            "{} belongs to '{}', not '{}'",
            proxy,
            proxy.remote(),
            remote
        )));
    }
    match proxy.reference() {
        Some(reference) => Ok(reference.to_json()),
        None => Err(Error::UnsupportedParam(format!(
            "the root proxy of '{}' has no reference",
            remote
        ))),
    }
}

/// Stub side: turns reference tuples in a response into proxies owned by `stub`.
pub fn unmarshal_result(stub: &Arc<RemoteStub>, result: Json) -> Value {
    match Reference::from_json(&result) {
        Some(reference) => Value::Proxy(ObjectProxy::new(stub.clone(), reference)),
        None => Value::Data(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Record;
    use serde_json::json;

    #[test]
    fn test_same_object_same_reference() {
        let mut registry = Registry::new();
        let point = Record::with_class("Point").field("x", json!(5)).into_live();

        let first = marshal_result(&mut registry, point.clone().into()).unwrap();
        let second = marshal_result(&mut registry, point.into()).unwrap();

        assert_eq!(first, json!({"class": "Point", "id": 0}));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_are_assigned_in_order() {
        let mut registry = Registry::new();
        let a = Record::new().into_live();
        let b = Record::new().into_live();

        assert_eq!(registry.intern(&a).id, 0);
        assert_eq!(registry.intern(&b).id, 1);
        assert_eq!(registry.intern(&a).id, 0);
    }

    #[test]
    fn test_data_is_never_registered() {
        let mut registry = Registry::new();
        let data = json!({"x": 5, "nested": [1, 2, {"y": null}]});

        let out = marshal_result(&mut registry, data.clone().into()).unwrap();

        assert_eq!(out, data);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unmarshal_resolves_identical_instance() {
        let mut registry = Registry::new();
        let point = Record::new().into_live();
        let wire = marshal_result(&mut registry, point.clone().into()).unwrap();

        let params = unmarshal_params(&registry, vec![wire, json!("x"), json!({"id": 0})]).unwrap();

        assert!(params[0].as_object().unwrap().ptr_eq(&point));
        assert_eq!(params[1], Value::from("x"));
        assert_eq!(params[2], Value::from(json!({"id": 0})));
    }

    #[test]
    fn test_unmarshal_unknown_reference() {
        let registry = Registry::new();
        let err = unmarshal_params(&registry, vec![json!({"class": "Object", "id": 9})]).unwrap_err();

        assert_eq!(err, Error::UnknownReference(Reference::new("Object", 9)));
        assert_eq!(err.kind(), ErrorKind::UnknownReference);
    }

    #[test]
    fn test_nested_reference_shape_stays_data() {
        let registry = Registry::new();
        let nested = json!([{"class": "Object", "id": 9}]);
        let params = unmarshal_params(&registry, vec![nested.clone()]).unwrap();
        assert_eq!(params[0], Value::Data(nested));
    }

    #[test]
    fn test_marshal_params_rejects_local_objects() {
        let err = marshal_params("b", vec![Record::new().into_live().into()]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedParam(_)));
    }
}
