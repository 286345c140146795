//! Tokio-based HTTP/1.1 server hosting a [`Handler`].
//!
//! `SseServer` spawns worker tasks that accept TCP connections and serve
//! them with `hyper`. Every request is bridged into a [`Scope`] and a
//! transport, and the handler runs in its own task so that a client going
//! away is seen by the handler as a disconnect rather than as its future
//! being dropped.
//!
//! [`Scope`]: crate::scope::Scope

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::middleware::Handler;

/// Tokio-based server for a [`Handler`].
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// or [`Bound`]. New servers start `Unbound` and must be bound before
/// running. Each worker task runs its own accept loop over the shared
/// listener; all workers share one handler instance.
pub struct SseServer<H, S = Unbound>
where
    H: Handler,
    S: ServerState,
{
    pub(crate) handler: Arc<H>,
    pub(crate) workers: usize,
    /// Single-use readiness notification, sent once all workers are spawned.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    /// Capacity of each response body channel, in chunks.
    pub(crate) body_buffer: usize,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod bridge;
mod config;
mod connection;
pub mod error;
mod runtime;

pub use error::ServerError;
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
