//! Canonical error types shared by handlers and transports.
//!
//! Transport errors describe why a lifecycle message could not be delivered
//! to the client. Handler errors wrap them alongside application failures so
//! a handler can propagate with `?` while the tracking interceptor still sees
//! the original termination cause.

use thiserror::Error;

/// Failure to deliver a lifecycle message through a [`Transport`].
///
/// [`Transport`]: crate::transport::Transport
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The client went away before the message could be delivered.
    #[error("client disconnected")]
    Disconnected,
    /// A second `response.start` was sent for the same request.
    #[error("response already started")]
    AlreadyStarted,
    /// A `response.body` was sent before `response.start`.
    #[error("response body sent before response start")]
    NotStarted,
    /// A message was sent after the terminating `response.body`.
    #[error("response already completed")]
    Completed,
    /// The scope has no client to respond to.
    #[error("scope does not accept a response")]
    NoResponse,
}

impl TransportError {
    /// Returns true if the error means the peer is gone rather than a
    /// misuse of the message protocol by the handler.
    #[must_use]
    pub fn is_disconnect(self) -> bool { matches!(self, Self::Disconnected) }
}

/// Error returned by a [`Handler`](crate::middleware::Handler).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The application failed while producing a response.
    #[error("application error: {0}")]
    Application(String),
}

impl HandlerError {
    /// Convenience constructor for application failures.
    pub fn application(message: impl Into<String>) -> Self { Self::Application(message.into()) }
}
