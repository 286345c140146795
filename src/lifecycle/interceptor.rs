//! Tracking middleware placed between the server and the application.
//!
//! [`TrackingInterceptor`] forwards every message the wrapped handler sends,
//! unchanged and in order, after showing it to a [`LifecycleTracker`]. The
//! tracker lives in a [`ReportGuard`] whose `Drop` classifies and reports the
//! request, so the report is produced however the handler exits: by
//! returning, by returning an error, by panicking, or by having its future
//! dropped when the request task is cancelled.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    message::LifecycleMessage,
    report::{LifecycleReport, LogReporter, Reporter, Termination},
    tracker::LifecycleTracker,
};
use crate::{
    error::{HandlerError, TransportError},
    metrics,
    middleware::{Handler, Next, Transform},
    panic::format_panic,
    scope::Scope,
    transport::Transport,
};

/// Middleware factory producing [`TrackingInterceptor`]s.
///
/// ```
/// use ssetrace::{app::McpApp, lifecycle::TrackingLayer};
///
/// let tracked = TrackingLayer::new().wrap(McpApp::default());
/// # let _ = tracked;
/// ```
#[derive(Debug)]
pub struct TrackingLayer<R = LogReporter> {
    reporter: Arc<R>,
}

impl TrackingLayer<LogReporter> {
    /// Layer reporting through `tracing`.
    #[must_use]
    pub fn new() -> Self { Self::with_reporter(LogReporter) }
}

impl Default for TrackingLayer<LogReporter> {
    fn default() -> Self { Self::new() }
}

impl<R> Clone for TrackingLayer<R> {
    fn clone(&self) -> Self {
        Self {
            reporter: Arc::clone(&self.reporter),
        }
    }
}

impl<R: Reporter> TrackingLayer<R> {
    /// Layer sending reports to `reporter`.
    #[must_use]
    pub fn with_reporter(reporter: R) -> Self {
        Self {
            reporter: Arc::new(reporter),
        }
    }

    /// Wrap `handler` without going through the async [`Transform`] API.
    pub fn wrap<H: Handler>(&self, handler: H) -> TrackingInterceptor<H, R> {
        TrackingInterceptor {
            inner: handler,
            reporter: Arc::clone(&self.reporter),
        }
    }
}

#[async_trait]
impl<H, R> Transform<H> for TrackingLayer<R>
where
    H: Handler,
    R: Reporter,
{
    type Output = TrackingInterceptor<H, R>;

    async fn transform(&self, handler: H) -> Self::Output { self.wrap(handler) }
}

/// Handler wrapper that tracks and reports each HTTP request's lifecycle.
#[derive(Debug)]
pub struct TrackingInterceptor<H, R = LogReporter> {
    inner: H,
    reporter: Arc<R>,
}

impl<H, R> TrackingInterceptor<H, R> {
    /// The wrapped handler.
    pub fn inner(&self) -> &H { &self.inner }
}

#[async_trait]
impl<H, R> Handler for TrackingInterceptor<H, R>
where
    H: Handler,
    R: Reporter,
{
    async fn call(&self, scope: Scope, transport: &mut dyn Transport) -> Result<(), HandlerError> {
        let next = Next::new(&self.inner);
        if !scope.is_http() {
            return next.call(scope, transport).await;
        }

        let reporter: Arc<dyn Reporter> = self.reporter.clone();
        let mut guard = ReportGuard::new(scope.path(), reporter);
        let result = {
            let mut tracking = TrackingTransport {
                inner: transport,
                guard: &mut guard,
            };
            next.call(scope, &mut tracking).await
        };
        guard.finish(&result);
        result
    }
}

/// Transport wrapper feeding every message to the guard before forwarding.
struct TrackingTransport<'a, T: ?Sized> {
    inner: &'a mut T,
    guard: &'a mut ReportGuard,
}

#[async_trait]
impl<T> Transport for TrackingTransport<'_, T>
where
    T: Transport + ?Sized,
{
    async fn send(&mut self, message: LifecycleMessage) -> Result<(), TransportError> {
        self.guard.observe(&message);
        self.inner.send(message).await
    }

    async fn disconnected(&mut self) { self.inner.disconnected().await; }
}

/// Owns a request's tracker and reports its classification on drop.
pub struct ReportGuard {
    tracker: LifecycleTracker,
    reporter: Arc<dyn Reporter>,
    started: Instant,
    termination: Option<Termination>,
}

impl ReportGuard {
    /// Start tracking the request at `path`.
    pub fn new(path: &str, reporter: Arc<dyn Reporter>) -> Self {
        metrics::inc_active_requests();
        Self {
            tracker: LifecycleTracker::new(path),
            reporter,
            started: Instant::now(),
            termination: None,
        }
    }

    /// Record a message about to be forwarded.
    ///
    /// Rejections from the tracker are logged; forwarding is unaffected.
    pub fn observe(&mut self, message: &LifecycleMessage) {
        let path = self.tracker.state().path();
        match message {
            LifecycleMessage::Start { status, .. } => {
                debug!(path, status = status.as_u16(), "response.start");
            }
            LifecycleMessage::Body { more_body, .. } => {
                debug!(
                    path,
                    bytes = message.byte_count(),
                    more_body,
                    "response.body"
                );
            }
        }
        metrics::inc_messages(message.kind());
        if let Err(err) = self.tracker.observe(message) {
            warn!(path = self.tracker.state().path(), error = %err, "unexpected lifecycle message");
        }
    }

    /// Record how the handler returned.
    ///
    /// Without this call the guard reports `Cancelled`, or `Panicked` when
    /// dropped during unwinding.
    pub fn finish(&mut self, result: &Result<(), HandlerError>) {
        self.termination = Some(match result {
            Ok(()) => Termination::Returned,
            Err(err) => Termination::Errored(err.to_string()),
        });
    }

    #[must_use]
    pub fn tracker(&self) -> &LifecycleTracker { &self.tracker }
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        metrics::dec_active_requests();
        let termination = self.termination.take().unwrap_or_else(|| {
            if std::thread::panicking() {
                Termination::Panicked
            } else {
                Termination::Cancelled
            }
        });
        let classification = self.tracker.classify();
        metrics::inc_classification(classification);
        let report = LifecycleReport::new(
            self.tracker.state(),
            classification,
            termination,
            self.started.elapsed(),
        );

        // A panic raised here while already unwinding would abort, so this
        // only shields the non-unwinding exits.
        let reporter = &self.reporter;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| reporter.report(&report))) {
            warn!(
                path = %report.path,
                panic = %format_panic(payload.as_ref()),
                "lifecycle reporter panicked"
            );
        }
    }
}
