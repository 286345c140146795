//! Bridge between `hyper` requests and the [`Handler`]/[`Transport`] boundary.
//!
//! The service collects the request body, builds a [`Scope`] and spawns the
//! handler on its own task. The handler talks to a [`HyperTransport`]: the
//! response head travels through a oneshot channel and body chunks through a
//! bounded mpsc channel that backs the streaming response body. When the
//! client goes away `hyper` drops the receiving ends, which is what
//! [`Transport::disconnected`] waits for.

use std::{convert::Infallible, net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty, StreamBody, combinators::BoxBody};
use hyper::body::{Frame, Incoming};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, warn};

use crate::{
    error::{HandlerError, TransportError},
    lifecycle::LifecycleMessage,
    middleware::Handler,
    panic::format_panic,
    scope::Scope,
    transport::Transport,
};

/// Body type of every response produced by the server.
pub(super) type ResponseBody = BoxBody<Bytes, Infallible>;

#[derive(Debug)]
struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

/// Transport writing lifecycle messages into a `hyper` response.
///
/// `head` is present until `response.start` is sent and `body` until the
/// terminating `response.body`.
#[derive(Debug)]
pub(super) struct HyperTransport {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: Option<mpsc::Sender<Bytes>>,
}

/// Receiving half of a [`HyperTransport`], turned into a response once the
/// handler has started it.
#[derive(Debug)]
pub(super) struct PendingResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: mpsc::Receiver<Bytes>,
}

impl HyperTransport {
    /// Create a transport whose body channel holds up to `buffer` chunks.
    pub(super) fn channel(buffer: usize) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                head: Some(head_tx),
                body: Some(body_tx),
            },
            PendingResponse {
                head: head_rx,
                body: body_rx,
            },
        )
    }

    fn start(&mut self, head: ResponseHead) -> Result<(), TransportError> {
        let Some(sender) = self.head.take() else {
            return Err(if self.body.is_some() {
                TransportError::AlreadyStarted
            } else {
                TransportError::Completed
            });
        };
        sender
            .send(head)
            .map_err(|_| TransportError::Disconnected)
    }

    async fn write(&mut self, chunk: Bytes, more_body: bool) -> Result<(), TransportError> {
        if self.head.is_some() {
            return Err(TransportError::NotStarted);
        }
        let body = self.body.as_ref().ok_or(TransportError::Completed)?;
        if body.is_closed() {
            return Err(TransportError::Disconnected);
        }
        if !chunk.is_empty() {
            body.send(chunk)
                .await
                .map_err(|_| TransportError::Disconnected)?;
        }
        if !more_body {
            // Dropping the sender ends the response body stream.
            self.body = None;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&mut self, message: LifecycleMessage) -> Result<(), TransportError> {
        match message {
            LifecycleMessage::Start {
                status, headers, ..
            } => self.start(ResponseHead { status, headers }),
            LifecycleMessage::Body {
                chunk, more_body, ..
            } => self.write(chunk, more_body).await,
        }
    }

    async fn disconnected(&mut self) {
        if let Some(head) = self.head.as_mut() {
            head.closed().await;
        } else if let Some(body) = self.body.as_ref() {
            body.closed().await;
        } else {
            futures::future::pending::<()>().await;
        }
    }
}

impl PendingResponse {
    /// Wait for the response head and build a streaming response.
    ///
    /// A handler that returns without starting a response yields a bare
    /// `500 Internal Server Error`.
    pub(super) async fn response(self) -> Response<ResponseBody> {
        let Self { head, body } = self;
        match head.await {
            Ok(ResponseHead { status, headers }) => {
                let frames =
                    ReceiverStream::new(body).map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)));
                let mut response = Response::new(StreamBody::new(frames).boxed());
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(_) => status_response(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Empty::<Bytes>::new().boxed());
    *response.status_mut() = status;
    response
}

/// `hyper` service running `H` for every request on one connection.
pub(super) struct RequestService<H> {
    pub(super) handler: Arc<H>,
    pub(super) peer_addr: Option<SocketAddr>,
    pub(super) shutdown: CancellationToken,
    pub(super) tracker: TaskTracker,
    pub(super) body_buffer: usize,
}

impl<H> hyper::service::Service<Request<Incoming>> for RequestService<H>
where
    H: Handler,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let peer_addr = self.peer_addr;
        let shutdown = self.shutdown.clone();
        let tracker = self.tracker.clone();
        let body_buffer = self.body_buffer;
        async move {
            let (parts, body) = request.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    debug!(error = %e, ?peer_addr, "failed to read request body");
                    return Ok(status_response(StatusCode::BAD_REQUEST));
                }
            };
            let scope = Scope::http(parts.method, parts.uri.path(), parts.headers, body)
                .with_peer(peer_addr);
            let (transport, pending) = HyperTransport::channel(body_buffer);
            spawn_request_task(handler, scope, transport, shutdown, &tracker);
            Ok(pending.response().await)
        }
        .boxed()
    }
}

/// Run the handler for one request on a tracked task.
///
/// The task outlives the `hyper` service future so that a client
/// disconnect reaches the handler through its transport. Server shutdown
/// drops the handler future instead.
fn spawn_request_task<H: Handler>(
    handler: Arc<H>,
    scope: Scope,
    mut transport: HyperTransport,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) {
    let path = scope.path().to_owned();
    tracker.spawn(async move {
        let run = AssertUnwindSafe(handler.call(scope, &mut transport)).catch_unwind();
        select! {
            biased;

            () = shutdown.cancelled() => debug!(path = %path, "request cancelled by server shutdown"),
            result = run => match result {
                Ok(Ok(())) => {}
                Ok(Err(HandlerError::Transport(e))) if e.is_disconnect() => {
                    debug!(path = %path, "client disconnected during request");
                }
                Ok(Err(e)) => warn!(path = %path, error = %e, "request handler failed"),
                Err(panic) => {
                    error!(path = %path, panic = %format_panic(panic.as_ref()), "request handler panicked");
                }
            },
        }
    });
}
