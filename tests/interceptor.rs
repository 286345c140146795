//! Tests for the tracking interceptor.
//!
//! Each test wraps a scripted handler, drives it through an in-memory
//! transport and checks the forwarded messages and the single report.

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use http::{HeaderMap, StatusCode};
use log::Level;
use rstest::{fixture, rstest};
use serial_test::serial;
use ssetrace::{
    Classification,
    Handler,
    HandlerError,
    LifecycleMessage,
    LifecycleReport,
    Reporter,
    Scope,
    Termination,
    TrackingLayer,
    TransportError,
    lifecycle::MessageKind,
};
use ssetrace_testing::{
    Ending,
    LoggerHandle,
    MemoryTransport,
    RecordingReporter,
    ScriptedHandler,
    http_scope,
    logger,
};

fn start() -> LifecycleMessage { LifecycleMessage::start(StatusCode::OK, HeaderMap::new()) }

#[fixture]
fn reporter() -> RecordingReporter { RecordingReporter::default() }

fn tracked(
    reporter: &RecordingReporter,
    script: Vec<LifecycleMessage>,
    ending: Ending,
) -> impl Handler {
    TrackingLayer::with_reporter(reporter.clone()).wrap(ScriptedHandler::new(script, ending))
}

fn only_report(reporter: &RecordingReporter) -> LifecycleReport {
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1, "expected exactly one report: {reports:?}");
    reports.into_iter().next().expect("one report")
}

#[rstest]
#[tokio::test]
async fn messages_are_forwarded_unchanged_and_in_order(reporter: RecordingReporter) {
    let script = vec![
        start(),
        LifecycleMessage::body(&b"event: message\n"[..], true),
        LifecycleMessage::body(&b"data: {}\n\n"[..], false),
    ];
    let handler = tracked(&reporter, script, Ending::Return);
    let mut transport = MemoryTransport::new();

    handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect("handler succeeds");

    assert_eq!(
        transport.kinds(),
        [MessageKind::Start, MessageKind::Body, MessageKind::Body]
    );
    assert_eq!(transport.body(), b"event: message\ndata: {}\n\n");
    assert_eq!(transport.status(), Some(StatusCode::OK));
    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Clean);
    assert_eq!(report.termination, Termination::Returned);
    assert_eq!(report.message_count, 3);
    assert_eq!(report.path, "/mcp");
}

#[rstest]
#[case::start_only(vec![start()], Classification::Violation)]
#[case::nothing(vec![], Classification::Idle)]
#[case::partial_body(vec![start(), LifecycleMessage::body(&b"x"[..], true)], Classification::Clean)]
#[case::empty_final_body(vec![start(), LifecycleMessage::end()], Classification::Clean)]
#[tokio::test]
async fn classification_follows_observed_messages(
    reporter: RecordingReporter,
    #[case] script: Vec<LifecycleMessage>,
    #[case] expected: Classification,
) {
    let handler = tracked(&reporter, script, Ending::Return);
    let mut transport = MemoryTransport::new();

    handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect("handler succeeds");

    let report = only_report(&reporter);
    assert_eq!(report.classification, expected);
    assert_eq!(report.response_started, expected != Classification::Idle);
}

#[rstest]
#[tokio::test]
async fn handler_error_is_reported_and_returned(reporter: RecordingReporter) {
    let handler = tracked(&reporter, vec![start()], Ending::Fail("tool exploded".into()));
    let mut transport = MemoryTransport::new();

    let err = handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect_err("handler fails");

    assert!(matches!(err, HandlerError::Application(ref m) if m == "tool exploded"));
    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Violation);
    assert_eq!(
        report.termination,
        Termination::Errored("application error: tool exploded".into())
    );
}

#[rstest]
#[tokio::test]
async fn transport_failure_still_counts_the_attempted_message(reporter: RecordingReporter) {
    let script = vec![start(), LifecycleMessage::end()];
    let handler = tracked(&reporter, script, Ending::Return);
    let mut transport = MemoryTransport::new().fail_after(1, TransportError::Disconnected);

    let err = handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect_err("send fails");

    assert!(matches!(
        err,
        HandlerError::Transport(TransportError::Disconnected)
    ));
    assert_eq!(transport.kinds(), [MessageKind::Start]);
    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Clean);
    assert_eq!(report.message_count, 2);
}

#[rstest]
#[tokio::test]
async fn dropped_future_is_reported_as_cancelled(reporter: RecordingReporter) {
    let handler = tracked(&reporter, vec![start()], Ending::Hang);
    let mut transport = MemoryTransport::new();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        handler.call(http_scope("/mcp"), &mut transport),
    )
    .await;

    assert!(outcome.is_err(), "hanging handler should time out");
    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Violation);
    assert_eq!(report.termination, Termination::Cancelled);
}

#[rstest]
#[tokio::test]
async fn panicking_handler_is_reported_once(reporter: RecordingReporter) {
    let handler = tracked(&reporter, vec![start()], Ending::Panic("handler blew up"));
    let mut transport = MemoryTransport::new();

    let outcome = std::panic::AssertUnwindSafe(handler.call(http_scope("/mcp"), &mut transport))
        .catch_unwind()
        .await;

    assert!(outcome.is_err(), "panic should propagate to the caller");
    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Violation);
    assert_eq!(report.termination, Termination::Panicked);
}

#[rstest]
#[tokio::test]
async fn waiting_for_disconnect_sees_the_client_leave(reporter: RecordingReporter) {
    let handler = tracked(&reporter, vec![start()], Ending::AwaitDisconnect);
    let (mut transport, client) = MemoryTransport::with_disconnect();

    let call = handler.call(http_scope("/mcp"), &mut transport);
    client.disconnect();
    call.await.expect("handler returns after disconnect");

    let report = only_report(&reporter);
    assert_eq!(report.classification, Classification::Violation);
    assert_eq!(report.termination, Termination::Returned);
}

#[rstest]
#[tokio::test]
async fn lifespan_scope_bypasses_tracking(reporter: RecordingReporter) {
    let handler = tracked(&reporter, vec![], Ending::Return);
    let mut transport = MemoryTransport::new();

    handler
        .call(Scope::lifespan(), &mut transport)
        .await
        .expect("lifespan call succeeds");

    assert!(reporter.is_empty());
}

#[rstest]
#[tokio::test]
async fn each_request_gets_its_own_tracker(reporter: RecordingReporter) {
    let handler = Arc::new(tracked(&reporter, vec![start()], Ending::Return));

    let calls = ["/a", "/b", "/c"].map(|path| {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut transport = MemoryTransport::new();
            handler.call(http_scope(path), &mut transport).await
        })
    });
    for call in calls {
        call.await.expect("task joins").expect("handler succeeds");
    }

    let mut paths: Vec<_> = reporter.reports().into_iter().map(|r| r.path).collect();
    paths.sort();
    assert_eq!(paths, ["/a", "/b", "/c"]);
    assert!(reporter.reports().iter().all(|r| r.message_count == 1));
}

struct PanickingReporter;

impl Reporter for PanickingReporter {
    fn report(&self, _report: &LifecycleReport) { panic!("reporter is broken"); }
}

#[rstest]
#[serial]
#[tokio::test]
async fn reporter_panic_does_not_mask_handler_result(mut logger: LoggerHandle) {
    logger.clear();
    let handler = TrackingLayer::with_reporter(PanickingReporter)
        .wrap(ScriptedHandler::new([start(), LifecycleMessage::end()], Ending::Return));
    let mut transport = MemoryTransport::new();

    handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect("handler result survives the reporter panic");

    let warnings = logger.take_matching(Level::Warn, "lifecycle reporter panicked");
    assert_eq!(warnings.len(), 1, "warning not logged");
}

#[rstest]
#[serial]
#[tokio::test]
async fn default_layer_logs_violations_as_errors(mut logger: LoggerHandle) {
    logger.clear();
    let handler = TrackingLayer::new().wrap(ScriptedHandler::new([start()], Ending::Return));
    let mut transport = MemoryTransport::new();

    handler
        .call(http_scope("/mcp"), &mut transport)
        .await
        .expect("handler succeeds");

    let errors = logger.take_matching(Level::Error, "response lifecycle violation");
    assert_eq!(errors.len(), 1, "violation not logged");
}
