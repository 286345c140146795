//! Run a real [`SseServer`] on a free local port.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use ssetrace::{
    Handler,
    server::{ServerError, SseServer},
};
use tokio::{sync::oneshot, task::JoinHandle};

/// Result type for fallible test bodies and helpers.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding to an ephemeral localhost
/// port.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr)
}

/// A server running on a background task until [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Bind `handler` to a free port and wait until it accepts connections.
    ///
    /// # Errors
    ///
    /// Fails if binding fails or the server exits before signalling
    /// readiness.
    pub async fn spawn<H: Handler>(handler: H) -> TestResult<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = SseServer::new(handler)
            .workers(1)
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener()?)?;
        let addr = server.try_local_addr()?;
        let task = tokio::spawn(server.run_with_shutdown(async move {
            let _ = stop_rx.await;
        }));
        tokio::time::timeout(Duration::from_secs(5), ready_rx).await??;
        Ok(Self {
            addr,
            stop: Some(stop_tx),
            task,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Absolute URL of `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String { format!("http://{}{path}", self.addr) }

    /// Stop accepting, cancel in-flight requests and wait for the server.
    ///
    /// # Errors
    ///
    /// Fails if the server task panicked or returned an error.
    pub async fn shutdown(mut self) -> TestResult {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await??;
        Ok(())
    }
}
