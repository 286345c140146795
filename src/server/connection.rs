//! Connection handling for [`SseServer`](super::SseServer).

use std::{net::SocketAddr, panic::AssertUnwindSafe, pin::pin, sync::Arc};

use futures::FutureExt;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use log::error;
use tokio::{net::TcpStream, select};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::bridge::RequestService;
use crate::{middleware::Handler, panic::format_panic};

/// Everything a connection task needs besides the stream itself.
pub(super) struct ConnectionContext<H> {
    pub handler: Arc<H>,
    pub peer_addr: Option<SocketAddr>,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub body_buffer: usize,
}

/// Spawn a task serving HTTP/1.1 on `stream`, logging and discarding any
/// panics.
pub(super) fn spawn_connection_task<H: Handler>(stream: TcpStream, ctx: ConnectionContext<H>) {
    let tracker = ctx.tracker.clone();
    let peer_addr = ctx.peer_addr;
    tracker.spawn(async move {
        let fut = AssertUnwindSafe(serve_connection(stream, ctx)).catch_unwind();

        if let Err(panic) = fut.await {
            let panic_msg = format_panic(panic.as_ref());
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve_connection<H: Handler>(stream: TcpStream, ctx: ConnectionContext<H>) {
    let ConnectionContext {
        handler,
        peer_addr,
        shutdown,
        tracker,
        body_buffer,
    } = ctx;
    let service = RequestService {
        handler,
        peer_addr,
        shutdown: shutdown.clone(),
        tracker,
        body_buffer,
    };
    let mut conn = pin!(http1::Builder::new().serve_connection(TokioIo::new(stream), service));

    let result = select! {
        res = conn.as_mut() => res,
        () = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    match result {
        Ok(()) => tracing::debug!(?peer_addr, "connection closed"),
        Err(e) if e.is_incomplete_message() || e.is_canceled() => {
            tracing::debug!(?peer_addr, error = %e, "client went away");
        }
        Err(e) => tracing::warn!(?peer_addr, error = %e, "connection error"),
    }
}
