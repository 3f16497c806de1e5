//! # Remote Stub
//!
//! The caller's side of one remote endpoint. A stub assigns request ids,
//! parks a continuation for each outstanding request and completes it when
//! the router hands over the matching response.
//!
//! ## Invariants
//!
//! - Ids start at 0 and increase by one per request. An id is never reused.
//! - A continuation is completed at most once. The entry is removed before it
//!   is completed, so a duplicate response is reported as unmatched.
//! - Dropping a request future removes its entry. A response that arrives
//!   afterwards is unmatched.
//! - Buffered notifications always leave ahead of the next request, in the
//!   order they were queued.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dynwire::Body;
use dynwire::ErrorObject;
use dynwire::Json;
use dynwire::Message;
use dynwire::control;
use tokio::sync::oneshot;

use crate::class::ClassInfo;
use crate::error::ErrorKind;
use crate::link;
use crate::link::ConnectionState;
use crate::link::Link;
use crate::marshal;
use crate::proxy::ObjectProxy;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Error {
    Marshal(marshal::Error),
    Link(link::Error),
    /// The remote host answered with an error response.
    Remote(ErrorObject),
    /// A response carried an id with no outstanding request.
    UnmatchedResponse(u64),
    /// No response arrived within the configured timeout.
    Timeout(u64),
    /// The connection ended before the response arrived.
    Disconnected(ConnectionState),
    /// The response does not have the expected shape.
    Malformed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Marshal(e) => e.kind(),
            Self::Link(e) => e.kind(),
            Self::Remote(_) => ErrorKind::Remote,
            Self::UnmatchedResponse(_) => ErrorKind::UnmatchedResponse,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Disconnected(_) => ErrorKind::TransportFailure,
            Self::Malformed(_) => ErrorKind::Protocol,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marshal(e) => write!(f, "Marshal error: {}", e),
            Self::Link(e) => write!(f, "{}", e),
            Self::Remote(e) => write!(f, "Remote error: {}", e),
            Self::UnmatchedResponse(id) => write!(f, "Unmatched response for request {}", id),
            Self::Timeout(id) => write!(f, "Request {} timed out", id),
            Self::Disconnected(state) => write!(f, "Connection {} before the response arrived", state),
            Self::Malformed(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<marshal::Error> for Error {
    fn from(e: marshal::Error) -> Self {
        Self::Marshal(e)
    }
}

impl From<link::Error> for Error {
    fn from(e: link::Error) -> Self {
        Self::Link(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Pending = DashMap<u64, oneshot::Sender<Result<Json>>>;

/// Removes a pending entry when the request future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Sends requests to one remote endpoint and correlates the responses.
pub struct RemoteStub {
    remote: String,
    link: Arc<Link>,
    pending: Pending,
    next_id: AtomicU64,
    outbox: Mutex<Vec<Message>>,
    classes: DashMap<String, Option<ClassInfo>>,
    timeout: Option<Duration>,
}

impl RemoteStub {
    pub fn new(remote: impl Into<String>, link: Arc<Link>, timeout: Option<Duration>) -> Self {
        Self {
            remote: remote.into(),
            link,
            pending: DashMap::new(),
            next_id: AtomicU64::new(0),
            outbox: Mutex::new(Vec::new()),
            classes: DashMap::new(),
            timeout,
        }
    }

    /// Name of the endpoint this stub talks to.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Number of requests still waiting for a response.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sends a request and waits for its response.
    ///
    /// Buffered notifications are flushed in the same envelope, ahead of the
    /// request.
    pub async fn request(self: &Arc<Self>, method: &str, params: Vec<Value>) -> Result<Value> {
        let params = marshal::marshal_params(&self.remote, params)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard { pending: &self.pending, id };

        let request = Message::request(id, method, params);
        let mut messages = self.take_outbox();
        let body = if messages.is_empty() {
            Body::Single(request)
        } else {
            messages.push(request);
            Body::Batch(messages)
        };

        tracing::trace!(remote = %self.remote, id, method, "request");
        self.link.send(&self.remote, body).await?;

        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(remote = %self.remote, id, method, "request timed out");
                    return Err(Error::Timeout(id));
                }
            },
            None => rx.await,
        };

        let result = outcome.map_err(|_| Error::Disconnected(self.link.state()))??;
        Ok(marshal::unmarshal_result(self, result))
    }

    /// Queues a notification. Nothing is sent until [`flush`](Self::flush) or
    /// the next request.
    pub fn notify(&self, method: &str, params: Vec<Value>) -> Result<()> {
        let state = self.link.state();
        if state.is_terminal() {
            return Err(Error::Disconnected(state));
        }
        let params = marshal::marshal_params(&self.remote, params)?;
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Message::notification(method, params));
        Ok(())
    }

    /// Sends every buffered notification as one envelope.
    pub async fn flush(&self) -> Result<()> {
        let Some(body) = Body::from_messages(self.take_outbox()) else {
            return Ok(());
        };
        self.link.send(&self.remote, body).await?;
        Ok(())
    }

    fn take_outbox(&self) -> Vec<Message> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Completes the request a response belongs to.
    ///
    /// Returns `UnmatchedResponse` if no request with that id is outstanding.
    pub fn on_receive(&self, message: Message) -> Result<()> {
        let Some(id) = message.id else {
            return Err(Error::Malformed("response without an id".into()));
        };

        let Some((_, tx)) = self.pending.remove(&id) else {
            return Err(Error::UnmatchedResponse(id));
        };

        if let Some(invalid) = message.invalid {
            let _ = tx.send(Err(Error::Malformed(format!("response {}: {}", id, invalid.reason))));
            return Ok(());
        }

        let outcome = match (message.result, message.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(Error::Remote(error)),
            _ => Err(Error::Malformed(format!(
                "response {} must carry exactly one of result and error",
                id
            ))),
        };

        // the caller may have stopped waiting
        let _ = tx.send(outcome);
        Ok(())
    }

    /// Fails every outstanding request with `error` and discards queued notifications.
    pub fn fail_all(&self, error: Error) {
        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        if !keys.is_empty() {
            tracing::warn!(remote = %self.remote, count = keys.len(), "failing pending requests: {}", error);
        }
        for key in keys {
            if let Some((_, tx)) = self.pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
        self.take_outbox();
    }

    /// A proxy for the remote root object. Sends nothing.
    pub fn root(self: &Arc<Self>) -> ObjectProxy {
        ObjectProxy::root(self.clone())
    }

    /// Asks the remote host for its root object by reference.
    pub async fn root_object(self: &Arc<Self>) -> Result<Value> {
        self.request(control::ROOT, vec![]).await
    }

    /// Constructs an instance of a class registered on the remote host.
    pub async fn construct(self: &Arc<Self>, class: &str, args: Vec<Value>) -> Result<Value> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::from(class));
        params.extend(args);
        self.request(control::NEW, params).await
    }

    /// Describes a class registered on the remote host. Answers are cached.
    pub async fn inspect(self: &Arc<Self>, class: &str) -> Result<Option<ClassInfo>> {
        if let Some(cached) = self.classes.get(class) {
            return Ok(cached.clone());
        }

        let info = match self.request(control::INSPECT, vec![Value::from(class)]).await? {
            Value::Data(Json::Null) => None,
            Value::Data(json) => Some(
                serde_json::from_value::<ClassInfo>(json)
                    .map_err(|e| Error::Malformed(format!("class info for {}: {}", class, e)))?,
            ),
            other => {
                return Err(Error::Malformed(format!(
                    "class info for {} was {}",
                    class,
                    other.describe()
                )));
            }
        };

        self.classes.insert(class.to_string(), info.clone());
        Ok(info)
    }
}

impl std::fmt::Debug for RemoteStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStub")
            .field("remote", &self.remote)
            .field("pending", &self.pending.len())
            .finish()
    }
}
