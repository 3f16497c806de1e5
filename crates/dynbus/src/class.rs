//! # Class Ledger
//!
//! The ledger is the host's catalogue of globally visible classes. It serves
//! two built-ins: `__new__` constructs instances through it, and `__inspect__`
//! reports a class's shape from it.
//!
//! ## Philosophy
//!
//! - **Declared, not reflected**: A class's parent, methods and properties are
//!   what its definition declares. Nothing is discovered from the Rust type.
//! - **Informational**: The ledger never gates dispatch. An object answers
//!   whatever its `Exposed` impl answers, declared or not.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::object;
use crate::object::LiveObject;
use crate::value::Value;

/// Builds a new instance from positional constructor arguments.
pub type Constructor = Arc<dyn Fn(Vec<Value>) -> object::Result<LiveObject> + Send + Sync>;

/// The definition of a class registered with a host.
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    parent: Option<String>,
    methods: Vec<String>,
    properties: Vec<String>,
    constructor: Option<Constructor>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            methods: Vec::new(),
            properties: Vec::new(),
            constructor: None,
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    /// Makes the class constructible through `__new__`.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> object::Result<LiveObject> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> ClassInfo {
        ClassInfo {
            name: self.name.clone(),
            parent: self.parent.clone(),
            methods: self.methods.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl std::fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("methods", &self.methods)
            .field("properties", &self.properties)
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

/// The shape of a class as reported by `__inspect__`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
}

impl ClassInfo {
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }
}

/// Why `__new__` could not produce an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No class with this name is registered.
    UnknownClass(String),
    /// The class is registered without a constructor.
    NotConstructible(String),
    /// The constructor itself failed.
    Constructor(object::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownClass(name) => write!(f, "Unknown class: {}", name),
            Self::NotConstructible(name) => write!(f, "Class '{}' has no constructor", name),
            Self::Constructor(e) => write!(f, "Constructor failed: {}", e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A registry of the classes a host makes visible by name.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    classes: HashMap<String, ClassDef>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, replacing any previous definition with the same name.
    pub fn insert(&mut self, class: ClassDef) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Looks up the shape of a class. `None` if the class is unknown.
    pub fn inspect(&self, name: &str) -> Option<ClassInfo> {
        self.classes.get(name).map(ClassDef::info)
    }

    /// Returns the constructor for a class, for the caller to run outside any lock.
    pub fn constructor(&self, name: &str) -> Result<Constructor> {
        let class = self
            .classes
            .get(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        class
            .constructor
            .clone()
            .ok_or_else(|| Error::NotConstructible(name.to_string()))
    }

    /// Constructs an instance of a named class.
    pub fn construct(&self, name: &str, args: Vec<Value>) -> Result<LiveObject> {
        let constructor = self.constructor(name)?;
        constructor(args).map_err(Error::Constructor)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
