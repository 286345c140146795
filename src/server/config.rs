//! Builder configuration and listener binding for [`SseServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::{net::TcpListener, sync::oneshot};

use super::{Bound, ServerError, ServerState, SseServer, Unbound, runtime::BackoffConfig};
use crate::middleware::Handler;

/// Default capacity of the per-request body channel.
pub(crate) const DEFAULT_BODY_BUFFER: usize = 16;

impl<H> SseServer<H, Unbound>
where
    H: Handler,
{
    /// Create a new server for `handler`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). Call [`bind`](Self::bind) before running
    /// the server.
    #[must_use]
    pub fn new(handler: H) -> Self { Self::from_shared(Arc::new(handler)) }

    /// Create a server around an already shared handler.
    #[must_use]
    pub fn from_shared(handler: Arc<H>) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            handler,
            workers,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            body_buffer: DEFAULT_BODY_BUFFER,
            state: Unbound,
        }
    }

    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Bind to a fresh address.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use ssetrace::{app::McpApp, server::SseServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    /// let server = SseServer::new(McpApp::default())
    ///     .bind(addr)
    ///     .expect("bind failed");
    /// assert!(server.local_addr().is_some());
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<SseServer<H, Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_listener(std_listener)
    }

    /// Bind to an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<SseServer<H, Bound>, ServerError> {
        let SseServer {
            handler,
            workers,
            ready_tx,
            backoff_config,
            body_buffer,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(SseServer {
            handler,
            workers,
            ready_tx,
            backoff_config,
            body_buffer,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }
}

impl<H> SseServer<H, Bound>
where
    H: Handler,
{
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }

    /// Returns the bound address.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if the socket cannot report its address.
    pub fn try_local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.state
            .listener
            .local_addr()
            .map_err(ServerError::LocalAddr)
    }
}

impl<H, S> SseServer<H, S>
where
    H: Handler,
    S: ServerState,
{
    /// Set the number of worker tasks to spawn for the server.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Override the accept-loop back-off.
    #[must_use]
    pub fn accept_backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config.normalized();
        self
    }

    /// Set how many body chunks may be queued per response before the
    /// handler waits for the client to catch up.
    #[must_use]
    pub fn body_buffer(mut self, chunks: usize) -> Self {
        self.body_buffer = chunks.max(1);
        self
    }

    /// Returns the configured number of worker tasks for the server.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Shared handler invoked for every request.
    #[must_use]
    pub fn handler(&self) -> &Arc<H> { &self.handler }
}
