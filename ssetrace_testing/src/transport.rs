//! In-memory [`Transport`] that records what a handler sends.

use std::sync::Arc;

use async_trait::async_trait;
use ssetrace::{LifecycleMessage, Transport, TransportError, lifecycle::MessageKind};
use tokio::sync::watch;

/// Triggers the disconnect of a [`MemoryTransport`] from outside the handler.
#[derive(Debug, Clone)]
pub struct DisconnectHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl DisconnectHandle {
    /// Mark the client as gone; pending and future `disconnected()` calls
    /// resolve and later sends fail with [`TransportError::Disconnected`].
    pub fn disconnect(&self) { self.tx.send_replace(true); }
}

/// Records every message sent through it.
///
/// Messages are accepted in any order; the transport does not police the
/// start/body protocol so tests can observe exactly what a handler emitted.
#[derive(Debug)]
pub struct MemoryTransport {
    sent: Vec<LifecycleMessage>,
    gone: watch::Receiver<bool>,
    trigger: Arc<watch::Sender<bool>>,
    fail_after: Option<(usize, TransportError)>,
}

impl Default for MemoryTransport {
    fn default() -> Self { Self::new() }
}

impl MemoryTransport {
    /// A transport whose client never disconnects.
    #[must_use]
    pub fn new() -> Self {
        let (tx, gone) = watch::channel(false);
        Self {
            sent: Vec::new(),
            gone,
            trigger: Arc::new(tx),
            fail_after: None,
        }
    }

    /// A transport plus the handle that disconnects its client.
    #[must_use]
    pub fn with_disconnect() -> (Self, DisconnectHandle) {
        let transport = Self::new();
        let handle = DisconnectHandle {
            tx: Arc::clone(&transport.trigger),
        };
        (transport, handle)
    }

    /// A transport whose client has already left.
    #[must_use]
    pub fn disconnected_client() -> Self {
        let transport = Self::new();
        transport.trigger.send_replace(true);
        transport
    }

    /// Accept `count` messages, then fail every later send with `error`.
    #[must_use]
    pub fn fail_after(mut self, count: usize, error: TransportError) -> Self {
        self.fail_after = Some((count, error));
        self
    }

    #[must_use]
    pub fn messages(&self) -> &[LifecycleMessage] { &self.sent }

    #[must_use]
    pub fn kinds(&self) -> Vec<MessageKind> { self.sent.iter().map(LifecycleMessage::kind).collect() }

    /// Concatenated body bytes.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        self.sent
            .iter()
            .filter_map(|message| match message {
                LifecycleMessage::Body { chunk, .. } => Some(chunk.as_ref()),
                LifecycleMessage::Start { .. } => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Status of the first `response.start`, if any.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        self.sent.iter().find_map(|message| match message {
            LifecycleMessage::Start { status, .. } => Some(*status),
            LifecycleMessage::Body { .. } => None,
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: LifecycleMessage) -> Result<(), TransportError> {
        if *self.gone.borrow() {
            return Err(TransportError::Disconnected);
        }
        if let Some((count, error)) = self.fail_after
            && self.sent.len() >= count
        {
            return Err(error);
        }
        self.sent.push(message);
        Ok(())
    }

    async fn disconnected(&mut self) {
        // The sender lives in `self`, so the channel never closes underneath us.
        let _ = self.gone.wait_for(|gone| *gone).await;
    }
}
