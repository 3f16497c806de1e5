//! In-memory duplex transport.
//!
//! Two halves connected by tokio mpsc channels: messages sent on one half
//! appear on the other half's `recv()`. Used to wire endpoints to a relay in
//! the same process, and throughout the test suite.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::transport;
use crate::transport::Transport;

/// One half of an in-memory duplex channel.
pub struct DuplexChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl DuplexChannel {
    /// Creates a pair of transports connected to each other.
    ///
    /// Messages sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        (Self::new(tx_a, rx_b), Self::new(tx_b, rx_a))
    }

    /// Same as [`DuplexChannel::pair`], already boxed for use as `Arc<dyn Transport>`.
    pub fn shared_pair() -> (Arc<dyn Transport>, Arc<dyn Transport>) {
        let (a, b) = Self::pair();
        (Arc::new(a), Arc::new(b))
    }

    /// Creates a transport from separate tx and rx channels.
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait::async_trait]
impl Transport for DuplexChannel {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(transport::Error::Closed);
        };
        tx.send(payload.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("Peer half dropped".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            payload = rx.recv() => Ok(payload),
            _ = closed.changed() => Ok(None),
        }
    }

    async fn close(&self) -> transport::Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        // dropping the sender ends the peer's stream
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.closed.send_replace(true);
        Ok(())
    }
}
