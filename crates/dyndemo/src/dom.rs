//! A toy document tree, exposed the way a browser endpoint would expose its DOM.

use std::sync::Arc;
use std::sync::Mutex;

use dynbus::ClassDef;
use dynbus::Exposed;
use dynbus::LiveObject;
use dynbus::ObjectHost;
use dynbus::Record;
use dynbus::Value;
use dynbus::object;

pub struct Element {
    tag: String,
    text: Mutex<String>,
    children: Mutex<Vec<LiveObject>>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: Mutex::new(String::new()),
            children: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Exposed for Element {
    fn class_name(&self) -> &str {
        "HTMLElement"
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "tagName" => Some(Value::from(self.tag.to_uppercase())),
            "textContent" => self.text.lock().ok().map(|text| Value::from(text.clone())),
            "childElementCount" => self
                .children
                .lock()
                .ok()
                .map(|children| Value::from(children.len() as i64)),
            _ => None,
        }
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> object::Result<Value> {
        match method {
            "appendChild" => {
                let Some(child) = args.into_iter().next().and_then(|v| v.as_object().cloned()) else {
                    return Err(object::Error::BadArguments("appendChild expects an element".into()));
                };
                self.children
                    .lock()
                    .map_err(|_| object::Error::failed("element is poisoned"))?
                    .push(child.clone());
                Ok(Value::Object(child))
            }
            "setText" => {
                let text = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                *self.text.lock().map_err(|_| object::Error::failed("element is poisoned"))? = text;
                Ok(Value::null())
            }
            other => Err(object::Error::MethodNotFound(other.to_string())),
        }
    }
}

pub struct Document {
    body: LiveObject,
}

#[async_trait::async_trait]
impl Exposed for Document {
    fn class_name(&self) -> &str {
        "Document"
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "body" => Some(Value::Object(self.body.clone())),
            "title" => Some(Value::from("dynbus demo")),
            _ => None,
        }
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> object::Result<Value> {
        match method {
            "createElement" => {
                let Some(tag) = args.first().and_then(Value::as_str) else {
                    return Err(object::Error::BadArguments("createElement expects a tag name".into()));
                };
                Ok(Value::object(Element::new(tag)))
            }
            other => Err(object::Error::MethodNotFound(other.to_string())),
        }
    }
}

/// Sets a window as the host's root and registers the DOM classes.
pub fn install(host: &Arc<ObjectHost>) {
    let document = LiveObject::new(Document { body: LiveObject::new(Element::new("body")) });
    let window = Record::with_class("Window")
        .field("document", document)
        .field("innerWidth", 1280i64)
        .field("innerHeight", 720i64);
    host.set_root(window.into_live());

    host.register_class(ClassDef::new("Node").method("appendChild"));
    host.register_class(
        ClassDef::new("HTMLElement")
            .parent("Node")
            .property("tagName")
            .property("textContent")
            .property("childElementCount")
            .method("setText")
            .constructor(|args| {
                let tag = args.first().and_then(Value::as_str).unwrap_or("div");
                Ok(LiveObject::new(Element::new(tag)))
            }),
    );
    host.register_class(
        ClassDef::new("Document")
            .parent("Node")
            .property("body")
            .property("title")
            .method("createElement"),
    );
    host.register_class(
        ClassDef::new("Window")
            .property("document")
            .property("innerWidth")
            .property("innerHeight"),
    );
}
