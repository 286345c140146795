//! Errors raised by [`SseServer`](super::SseServer) operations.

use std::io;

use thiserror::Error;

/// Errors that may occur while binding or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// Reading the bound address failed.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}
