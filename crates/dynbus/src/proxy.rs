//! # Object Proxies
//!
//! A proxy is the caller's handle to one object on a remote host: the stub
//! that reaches the host, plus the object's reference. A proxy without a
//! reference stands for the host's root object.
//!
//! Creating or cloning a proxy never touches the network. Every operation
//! on it becomes a request whose first parameter is the target: the
//! reference tuple, or `null` for the root.

use std::collections::HashSet;
use std::sync::Arc;

use dynwire::Reference;
use dynwire::control;

use crate::stub;
use crate::stub::RemoteStub;
use crate::value::Value;

/// What kind of member a name denotes on a remote class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Property,
    Method,
}

#[derive(Clone)]
pub struct ObjectProxy {
    stub: Arc<RemoteStub>,
    reference: Option<Reference>,
}

impl ObjectProxy {
    pub fn new(stub: Arc<RemoteStub>, reference: Reference) -> Self {
        Self { stub, reference: Some(reference) }
    }

    /// A proxy for the root object of the stub's endpoint.
    pub fn root(stub: Arc<RemoteStub>) -> Self {
        Self { stub, reference: None }
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.reference.is_none()
    }

    /// Endpoint that owns the object.
    pub fn remote(&self) -> &str {
        self.stub.remote()
    }

    /// Class reported when the reference was issued. `None` for the root proxy.
    pub fn class_name(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.class.as_str())
    }

    pub fn stub(&self) -> &Arc<RemoteStub> {
        &self.stub
    }

    fn with_target(&self, args: Vec<Value>) -> Vec<Value> {
        let target = match self.reference {
            Some(_) => Value::Proxy(self.clone()),
            None => Value::null(),
        };
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(target);
        params.extend(args);
        params
    }

    /// Invokes a named operation on the remote object.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> stub::Result<Value> {
        self.stub.request(method, self.with_target(args)).await
    }

    /// Invokes an operation without waiting for, or receiving, a response.
    ///
    /// Queued on the stub until the next flush or request.
    pub fn notify(&self, method: &str, args: Vec<Value>) -> stub::Result<()> {
        self.stub.notify(method, self.with_target(args))
    }

    /// Reads a property of the remote object.
    pub async fn get(&self, name: &str) -> stub::Result<Value> {
        self.invoke(control::GETTER, vec![Value::from(name)]).await
    }

    /// Reports whether `name` is a property or a method of the object's class.
    ///
    /// Walks the parent chain as described by the remote host. Properties are
    /// checked before methods at each level. The root proxy fetches the root
    /// object first to learn its class.
    pub async fn member(&self, name: &str) -> stub::Result<Option<Member>> {
        let class = match &self.reference {
            Some(reference) => reference.class.clone(),
            None => match self.stub.root_object().await? {
                Value::Proxy(root) => match root.reference {
                    Some(reference) => reference.class,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            },
        };

        let mut visited = HashSet::new();
        let mut next = Some(class);
        while let Some(class) = next.take() {
            if !visited.insert(class.clone()) {
                tracing::warn!(remote = %self.remote(), class = %class, "class hierarchy has a cycle");
                break;
            }
            let Some(info) = self.stub.inspect(&class).await? else {
                break;
            };
            if info.has_property(name) {
                return Ok(Some(Member::Property));
            }
            if info.has_method(name) {
                return Ok(Some(Member::Method));
            }
            next = info.parent;
        }
        Ok(None)
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stub, &other.stub) && self.reference == other.reference
    }
}

impl std::fmt::Display for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}/{}", self.remote(), reference),
            None => write!(f, "{}/<root>", self.remote()),
        }
    }
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectProxy({})", self)
    }
}
