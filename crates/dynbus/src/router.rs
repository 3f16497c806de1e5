//! # Relay Router
//!
//! Binds one endpoint's host and its stubs to a single transport.
//!
//! ## Architecture
//!
//! A background pump reads envelopes off the transport and splits each body:
//! - `result`/`error` messages go to the stub registered for the envelope's
//!   `from`, and are completed inline on the pump.
//! - Everything else goes to the local host. Each request envelope is started
//!   on the pump in arrival order and runs there until it first has to wait;
//!   only then does it move to a task of its own. Work that never waits (a
//!   batch of property writes, say) is therefore finished before the next
//!   envelope is looked at, while a handler may still await calls back into
//!   its caller as the pump keeps delivering their responses.
//!
//! When the connection ends, for whatever reason, every stub's outstanding
//! requests are failed.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use dashmap::DashMap;
use futures::FutureExt;
use dynwire::Body;
use dynwire::ControlRequest;
use dynwire::Envelope;
use dynwire::Message;
use dynwire::control;
use tokio::task::JoinHandle;

use crate::config::Registration;
use crate::config::RouterConfig;
use crate::error::ErrorKind;
use crate::host::ObjectHost;
use crate::link;
use crate::link::ConnectionState;
use crate::link::Link;
use crate::stub;
use crate::stub::RemoteStub;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Error {
    Link(link::Error),
    /// `register` was called after the connection left `Connecting`.
    AlreadyRegistered(ConnectionState),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Link(e) => e.kind(),
            Self::AlreadyRegistered(_) => ErrorKind::RegistrationConflict,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link(e) => write!(f, "{}", e),
            Self::AlreadyRegistered(state) => write!(f, "Cannot register while {}", state),
        }
    }
}

impl std::error::Error for Error {}

impl From<link::Error> for Error {
    fn from(e: link::Error) -> Self {
        Self::Link(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

struct Inner {
    link: Arc<Link>,
    host: Arc<ObjectHost>,
    stubs: DashMap<String, Arc<RemoteStub>>,
    config: RouterConfig,
}

/// One endpoint's connection to the relay.
pub struct Router {
    inner: Arc<Inner>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Creates a router for `host`. Nothing is sent until [`register`](Self::register).
    pub fn new(host: Arc<ObjectHost>, transport: Arc<dyn Transport>, config: RouterConfig) -> Self {
        let link = Arc::new(Link::new(host.name(), transport, config.log_envelopes));
        Self {
            inner: Arc::new(Inner {
                link,
                host,
                stubs: DashMap::new(),
                config,
            }),
            pump: Mutex::new(None),
        }
    }

    /// Announces the endpoint to the relay and starts receiving.
    pub async fn register(&self) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connecting {
            return Err(Error::AlreadyRegistered(state));
        }

        let name = self.name().to_string();
        let message = match &self.inner.config.registration {
            Registration::Listen => ControlRequest::Listen(name.clone()).to_message(),
            Registration::Register => {
                Message::notification(control::REGISTER, vec![name.clone().into()])
            }
            Registration::Connect(remote) => ControlRequest::Connect(remote.clone()).to_message(),
        };
        self.inner
            .link
            .transmit(&Envelope::control(Some(name), message))
            .await?;
        self.inner.link.transition(ConnectionState::Registered);

        let inner = self.inner.clone();
        let pump = tokio::spawn(async move { Inner::pump(inner).await });
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
        Ok(())
    }

    /// Returns the stub for a remote endpoint, creating it on first use.
    pub fn stub(&self, remote: &str) -> Arc<RemoteStub> {
        self.inner
            .stubs
            .entry(remote.to_string())
            .or_insert_with(|| {
                Arc::new(RemoteStub::new(
                    remote,
                    self.inner.link.clone(),
                    self.inner.config.request_timeout,
                ))
            })
            .clone()
    }

    /// Sends an envelope as is.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let state = self.state();
        if !state.can_send() {
            return Err(Error::Link(link::Error::NotSendable(state)));
        }
        Ok(self.inner.link.transmit(envelope).await?)
    }

    /// Closes the connection and fails every outstanding request.
    pub async fn close(&self) -> Result<()> {
        let closed = self.inner.link.close().await;
        self.inner.fail_all(self.state());
        Ok(closed?)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.state()
    }

    /// Resolves once the connection is closed or has failed.
    pub async fn wait_closed(&self) -> ConnectionState {
        self.inner.link.terminated().await
    }

    pub fn host(&self) -> &Arc<ObjectHost> {
        &self.inner.host
    }

    pub fn name(&self) -> &str {
        self.inner.link.local()
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("stubs", &self.inner.stubs.len())
            .finish()
    }
}

impl Inner {
    async fn pump(inner: Arc<Inner>) {
        loop {
            let frame = tokio::select! {
                frame = inner.link.recv() => frame,
                _ = inner.link.terminated() => break,
            };

            match frame {
                Ok(Some(bytes)) => Self::handle_frame(&inner, &bytes),
                Ok(None) => {
                    tracing::info!(endpoint = %inner.link.local(), "transport closed");
                    inner.link.transition(ConnectionState::Closed);
                    break;
                }
                Err(e) => {
                    tracing::error!(endpoint = %inner.link.local(), "transport receive failed: {}", e);
                    inner.link.transition(ConnectionState::Errored);
                    break;
                }
            }
        }

        inner.fail_all(inner.link.state());
    }

    fn fail_all(&self, state: ConnectionState) {
        for entry in self.stubs.iter() {
            entry.value().fail_all(stub::Error::Disconnected(state));
        }
    }

    /// Whether an envelope addressed to `to` is meant for this endpoint.
    fn accepts(&self, to: &str) -> bool {
        match self.config.registration {
            Registration::Connect(_) => true,
            Registration::Listen | Registration::Register => to == self.link.local(),
        }
    }

    fn handle_frame(inner: &Arc<Inner>, bytes: &[u8]) {
        let local = inner.link.local();
        if inner.config.log_envelopes {
            tracing::debug!(endpoint = %local, "<-- {}", String::from_utf8_lossy(bytes));
        }

        let envelope = match dynwire::decode_envelope(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(endpoint = %local, "dropping malformed envelope: {}", e);
                return;
            }
        };
        inner.link.mark_active();

        let Some(to) = envelope.to.as_deref() else {
            tracing::warn!(endpoint = %local, "dropping control envelope sent to an endpoint");
            return;
        };
        if !inner.accepts(to) {
            tracing::warn!(endpoint = %local, to, "dropping envelope addressed elsewhere");
            return;
        }

        let from = envelope.from;
        let mut requests = Vec::new();
        for message in envelope.body.into_messages() {
            if message.is_response() {
                inner.deliver_response(from.as_deref(), message);
            } else {
                requests.push(message);
            }
        }

        let Some(body) = Body::from_messages(requests) else {
            return;
        };
        let inner = inner.clone();
        let mut serving = async move { inner.serve(from, body).await }.boxed();
        if (&mut serving).now_or_never().is_none() {
            tokio::spawn(serving);
        }
    }

    fn deliver_response(&self, from: Option<&str>, message: Message) {
        let local = self.link.local();
        let Some(from) = from else {
            tracing::warn!(endpoint = %local, "dropping response without a sender");
            return;
        };
        let Some(stub) = self.stubs.get(from).map(|entry| entry.value().clone()) else {
            tracing::warn!(endpoint = %local, from, "dropping response from an endpoint with no stub");
            return;
        };
        if let Err(e) = stub.on_receive(message) {
            tracing::warn!(endpoint = %local, from, kind = %e.kind(), "dropping response: {}", e);
        }
    }

    async fn serve(&self, from: Option<String>, body: Body) {
        let Some(reply) = self.host.on_receive(from.as_deref(), body).await else {
            return;
        };
        let Some(from) = from else {
            tracing::warn!(endpoint = %self.link.local(), "cannot reply to an envelope without a sender");
            return;
        };
        if let Err(e) = self.link.send(&from, reply).await {
            tracing::warn!(endpoint = %self.link.local(), to = %from, "reply not sent: {}", e);
        }
    }
}
