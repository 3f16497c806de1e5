//! # Object References
//!
//! A live object never crosses the wire. Instead the host that owns it sends
//! `{ "class": string, "id": integer }`, and the receiving side turns that
//! tuple back into a handle.
//!
//! The `class` member is informational: it is used for client-side typing and
//! inspection, never for resolution.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Wire form of a live object vended by a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub class: String,
    pub id: u64,
}

impl Reference {
    pub fn new(class: impl Into<String>, id: u64) -> Self {
        Self { class: class.into(), id }
    }

    /// Recognizes a reference tuple.
    ///
    /// Only an object with exactly the members `class` (string) and `id`
    /// (non-negative integer) qualifies. Any other map is plain data.
    pub fn from_json(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else { return None };
        if map.len() != 2 {
            return None;
        }
        let class = map.get("class")?.as_str()?;
        let id = map.get("id")?.as_u64()?;
        Some(Self::new(class, id))
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("class".into(), Value::String(self.class.clone()));
        map.insert("id".into(), Value::from(self.id));
        Value::Object(map)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}
