//! Runtime control for [`SseServer`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
use async_trait::async_trait;
pub use backoff::BackoffConfig;
use futures::Future;
use log::warn;
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, ServerError, SseServer};
use crate::{
    error::TransportError,
    lifecycle::LifecycleMessage,
    middleware::Handler,
    scope::Scope,
    transport::Transport,
};

impl<H> SseServer<H, Bound>
where
    H: Handler,
{
    /// Run the server until Ctrl+C is received.
    ///
    /// ```no_run
    /// use ssetrace::{app::McpApp, lifecycle::TrackingLayer, server::SseServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ssetrace::server::ServerError> {
    /// let handler = TrackingLayer::new().wrap(McpApp::default());
    /// SseServer::new(handler)
    ///     .bind(([127, 0, 0, 1], 8000).into())?
    ///     .run()
    ///     .await
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use ssetrace::{app::McpApp, server::SseServer};
    ///
    /// async fn try_run() {
    ///     SseServer::new(McpApp::default())
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the `Result` is kept for API stability.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the accept loops stop, open connections are asked to
    /// close gracefully and in-flight request tasks are cancelled. The call
    /// returns once every tracked task has finished.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::oneshot;
    /// use ssetrace::{app::McpApp, server::SseServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ssetrace::server::ServerError> {
    /// let server = SseServer::new(McpApp::default()).bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    ///
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let SseServer {
            handler,
            workers,
            ready_tx,
            backoff_config,
            body_buffer,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        notify_startup(handler.as_ref()).await;

        let options = AcceptLoopOptions {
            shutdown: shutdown_token.clone(),
            tracker: tracker.clone(),
            backoff: backoff_config,
            body_buffer,
        };
        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                Arc::clone(&handler),
                options.clone(),
            ));
        }

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

/// Transport handed to the handler for the startup scope.
///
/// Nothing listens on the other end, so sends are refused and the client
/// never disconnects.
struct LifespanTransport;

#[async_trait]
impl Transport for LifespanTransport {
    async fn send(&mut self, _message: LifecycleMessage) -> Result<(), TransportError> {
        Err(TransportError::NoResponse)
    }

    async fn disconnected(&mut self) { futures::future::pending::<()>().await }
}

/// Give the handler a chance to see the non-HTTP startup scope.
async fn notify_startup<H: Handler>(handler: &H) {
    if let Err(e) = handler.call(Scope::lifespan(), &mut LifespanTransport).await {
        warn!("lifespan startup failed: error={e}");
    }
}
