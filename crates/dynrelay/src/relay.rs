//! # Relay Hub
//!
//! Binds endpoint names to connections and forwards envelopes between them.
//!
//! ## Invariants
//!
//! - A name is bound to at most one connection. The newest registration
//!   wins; the connection it replaced stops receiving traffic for that name.
//! - `from` is always the sender's bound name, whatever the envelope said.
//! - A connection that goes away releases its name, unless another
//!   connection has claimed the name since.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dynbus::Transport;
use dynbus::transport;
use dynwire::ControlRequest;
use dynwire::INVALID_REQUEST;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;

/// Identifies one attached transport for the lifetime of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why an envelope was not forwarded.
#[derive(Debug, Clone)]
pub enum Error {
    Wire(dynwire::Error),
    /// The sender has not bound a name yet.
    Unregistered,
    /// No connection is bound to the destination.
    UnknownDestination(String),
    /// A pinned connection addressed someone other than its peer.
    UnexpectedDestination { pinned: String, to: String },
    /// Anonymous connections are disabled.
    AnonymousRefused,
    /// Forwarding to the destination failed.
    Transport { to: String, error: transport::Error },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "{}", e),
            Self::Unregistered => write!(f, "Sender has not registered a name"),
            Self::UnknownDestination(to) => write!(f, "Unknown destination: {}", to),
            Self::UnexpectedDestination { pinned, to } => {
                write!(f, "Connection is pinned to '{}', cannot send to '{}'", pinned, to)
            }
            Self::AnonymousRefused => write!(f, "Anonymous connections are disabled"),
            Self::Transport { to, error } => write!(f, "Forwarding to '{}' failed: {}", to, error),
        }
    }
}

impl std::error::Error for Error {}

impl From<dynwire::Error> for Error {
    fn from(e: dynwire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
struct Route {
    connection: ConnectionId,
    transport: Arc<dyn Transport>,
}

/// What the relay knows about one attached connection.
struct Session {
    id: ConnectionId,
    name: Option<String>,
    pinned: Option<String>,
}

struct Inner {
    routes: DashMap<String, Route>,
    config: RelayConfig,
    next_connection: AtomicU64,
}

/// Forwards envelopes between named endpoints.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                routes: DashMap::new(),
                config,
                next_connection: AtomicU64::new(0),
            }),
        }
    }

    /// Starts serving a transport. The task ends when the transport closes.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> (ConnectionId, JoinHandle<()>) {
        let id = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(connection = %id, "connection attached");
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.serve(id, transport).await });
        (id, task)
    }

    /// The connection currently bound to `name`.
    pub fn connection_for(&self, name: &str) -> Option<ConnectionId> {
        self.inner.routes.get(name).map(|route| route.connection)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.inner.routes.contains_key(name)
    }

    /// Names with a live binding, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.routes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl Inner {
    async fn serve(&self, id: ConnectionId, transport: Arc<dyn Transport>) {
        let mut session = Session { id, name: None, pinned: None };

        loop {
            match transport.recv().await {
                Ok(Some(bytes)) => {
                    if let Err(e) = self.handle(&mut session, &transport, &bytes).await {
                        tracing::warn!(
                            connection = %id,
                            code = INVALID_REQUEST,
                            "dropping envelope: {}",
                            e
                        );
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(connection = %id, "receive failed: {}", e);
                    break;
                }
            }
        }

        if let Some(name) = session.name.take() {
            self.unbind(id, &name);
        }
        tracing::debug!(connection = %id, "connection detached");
    }

    async fn handle(&self, session: &mut Session, transport: &Arc<dyn Transport>, bytes: &[u8]) -> Result<()> {
        let mut envelope = dynwire::decode_envelope(bytes)?;

        if envelope.is_control() {
            for message in envelope.body.messages() {
                let request = ControlRequest::from_message(message)?;
                self.control(session, transport, request)?;
            }
            return Ok(());
        }

        let from = session.name.clone().ok_or(Error::Unregistered)?;
        let to = envelope.to.clone().unwrap_or_default();
        if let Some(pinned) = &session.pinned {
            if *pinned != to {
                return Err(Error::UnexpectedDestination { pinned: pinned.clone(), to });
            }
        }

        let route = self
            .routes
            .get(&to)
            .map(|route| route.value().clone())
            .ok_or_else(|| Error::UnknownDestination(to.clone()))?;

        envelope.from = Some(from);
        let bytes = dynwire::encode_envelope(&envelope)?;
        tracing::trace!(from = ?envelope.from, to = %to, via = %route.connection, "forward");
        route
            .transport
            .send(&bytes)
            .await
            .map_err(|error| Error::Transport { to, error })
    }

    fn control(&self, session: &mut Session, transport: &Arc<dyn Transport>, request: ControlRequest) -> Result<()> {
        match request {
            ControlRequest::Listen(name) => {
                self.bind(session, transport, name);
                session.pinned = None;
            }
            ControlRequest::Connect(remote) => {
                if !self.config.allow_anonymous {
                    return Err(Error::AnonymousRefused);
                }
                let name = uuid::Uuid::new_v4().to_string();
                tracing::info!(connection = %session.id, name = %name, remote = %remote, "anonymous endpoint connected");
                self.bind(session, transport, name);
                session.pinned = Some(remote);
            }
        }
        Ok(())
    }

    fn bind(&self, session: &mut Session, transport: &Arc<dyn Transport>, name: String) {
        if let Some(previous) = session.name.take() {
            if previous != name {
                self.unbind(session.id, &previous);
            }
        }

        let route = Route { connection: session.id, transport: transport.clone() };
        if let Some(replaced) = self.routes.insert(name.clone(), route) {
            if replaced.connection != session.id {
                tracing::info!(
                    name = %name,
                    old = %replaced.connection,
                    new = %session.id,
                    "registration superseded"
                );
            }
        }
        tracing::info!(connection = %session.id, name = %name, "endpoint bound");
        session.name = Some(name);
    }

    fn unbind(&self, id: ConnectionId, name: &str) {
        if self.routes.remove_if(name, |_, route| route.connection == id).is_some() {
            tracing::info!(connection = %id, name = %name, "endpoint released");
        }
    }
}
