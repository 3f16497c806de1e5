//! # Connection Link
//!
//! The link is the single path from an endpoint to its transport. Stubs and
//! the router both send through it, so it is where the connection state is
//! enforced and where outbound envelopes are logged.
//!
//! ## Invariants
//!
//! - State only moves forward: `Connecting → Registered → Active`, then
//!   `Closed` or `Errored`. A terminal state is never left.
//! - Nothing is transmitted once the state is terminal.
//! - A failed transport send moves the link to `Errored`.

use std::sync::Arc;

use dynwire::Body;
use dynwire::Envelope;
use tokio::sync::watch;

use crate::error::ErrorKind;
use crate::transport;
use crate::transport::Transport;

/// Lifecycle of an endpoint's connection to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, registration not yet sent.
    Connecting,
    /// Registration sent, nothing received yet.
    Registered,
    /// At least one envelope has been received.
    Active,
    /// Closed locally or by the peer.
    Closed,
    /// The transport failed.
    Errored,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// Whether application traffic may be sent in this state.
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Registered | Self::Active)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// The connection is not in a state that allows sending.
    NotSendable(ConnectionState),
    Transport(transport::Error),
    Wire(dynwire::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSendable(_) | Self::Transport(_) => ErrorKind::TransportFailure,
            Self::Wire(_) => ErrorKind::Protocol,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSendable(state) => write!(f, "Cannot send while {}", state),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<dynwire::Error> for Error {
    fn from(e: dynwire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Link {
    local: String,
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
    log_envelopes: bool,
}

impl Link {
    pub fn new(local: impl Into<String>, transport: Arc<dyn Transport>, log_envelopes: bool) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            local: local.into(),
            transport,
            state,
            log_envelopes,
        }
    }

    /// Name stamped into the `from` member of outbound envelopes.
    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `next`. Returns false if the link is already terminal or already there.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut previous = None;
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            previous = Some(*state);
            *state = next;
            true
        });
        if let Some(previous) = previous {
            tracing::info!(endpoint = %self.local, "connection {} -> {}", previous, next);
        }
        changed
    }

    /// Marks the first inbound traffic after registration.
    pub fn mark_active(&self) {
        if self.state() == ConnectionState::Registered {
            self.transition(ConnectionState::Active);
        }
    }

    /// Resolves once the link reaches a terminal state, returning that state.
    pub async fn terminated(&self) -> ConnectionState {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(ConnectionState::is_terminal).await;
        let state = *rx.borrow();
        state
    }

    /// Encodes and sends an envelope, whatever its addressing.
    ///
    /// Only refuses once the link is terminal, so registration can go out
    /// while `Connecting`.
    pub async fn transmit(&self, envelope: &Envelope) -> Result<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(Error::NotSendable(state));
        }

        let bytes = dynwire::encode_envelope(envelope)?;
        if self.log_envelopes {
            tracing::debug!(
                endpoint = %self.local,
                "--> {}",
                String::from_utf8_lossy(&bytes)
            );
        }

        if let Err(e) = self.transport.send(&bytes).await {
            tracing::error!(endpoint = %self.local, "transport send failed: {}", e);
            self.transition(ConnectionState::Errored);
            return Err(e.into());
        }
        Ok(())
    }

    /// Sends application traffic to the endpoint named `to`.
    pub async fn send(&self, to: &str, body: Body) -> Result<()> {
        let state = self.state();
        if !state.can_send() {
            return Err(Error::NotSendable(state));
        }
        let envelope = Envelope::new(Some(to.to_string()), Some(self.local.clone()), body);
        self.transmit(&envelope).await
    }

    pub(crate) async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        self.transport.recv().await
    }

    /// Moves to `Closed` and closes the transport.
    pub async fn close(&self) -> Result<()> {
        self.transition(ConnectionState::Closed);
        self.transport.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("local", &self.local)
            .field("state", &self.state())
            .finish()
    }
}
