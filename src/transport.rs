//! The sending half of the handler/transport boundary.

use async_trait::async_trait;

use crate::{error::TransportError, lifecycle::LifecycleMessage};

/// Delivers lifecycle messages for a single request to the client.
///
/// A transport belongs to exactly one request. Handlers emit
/// `response.start` once, followed by body chunks, the last of which has
/// `more_body == false`.
#[async_trait]
pub trait Transport: Send {
    /// Send `message` to the client.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the client is gone or the message
    /// breaks the start/body ordering.
    async fn send(&mut self, message: LifecycleMessage) -> Result<(), TransportError>;

    /// Resolve once the client has disconnected.
    ///
    /// Never resolves for a client that stays connected. Cancel-safe.
    async fn disconnected(&mut self);
}
