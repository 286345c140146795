//! Drives disconnect scenarios against a real server and checks what the
//! tracking interceptor reported.

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use reqwest::Url;
use rstest::{fixture, rstest};
use serde_json::json;
use ssetrace::{
    Classification,
    DisconnectSignal,
    LifecycleMessage,
    ScenarioDescriptor,
    ScenarioRunner,
    ScenarioSuite,
    Strategy,
    Termination,
    TrackingLayer,
    app::{
        AppConfig,
        McpApp,
        tools::{GREETING_TOOL, SLOW_TOOL},
    },
    scenario::{RunnerConfig, ScenarioTermination, SuiteStep, payload},
};
use ssetrace_testing::{Ending, RecordingReporter, ScriptedHandler, TestResult, TestServer};

const REPORT_WAIT: Duration = Duration::from_secs(5);

#[fixture]
fn reporter() -> RecordingReporter { RecordingReporter::default() }

async fn tracked_app(reporter: &RecordingReporter, slow_delay: Duration) -> TestResult<TestServer> {
    let app = McpApp::new(AppConfig {
        slow_delay,
        ..AppConfig::default()
    });
    TestServer::spawn(TrackingLayer::with_reporter(reporter.clone()).wrap(app)).await
}

fn runner(server: &TestServer) -> TestResult<ScenarioRunner> {
    let endpoint = Url::parse(&server.url("/mcp"))?;
    Ok(ScenarioRunner::new(endpoint)?)
}

#[rstest]
#[tokio::test]
async fn client_leaving_before_the_first_event_is_a_violation(
    reporter: RecordingReporter,
) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_secs(1)).await?;
    let descriptor = ScenarioDescriptor::new(
        "delayed_slow",
        Strategy::DelayedMs(200),
        payload::tool_call_request(SLOW_TOOL, json!({})),
    );

    let outcome = runner(&server)?.run(&descriptor).await;

    assert!(outcome.expected_signal_observed(), "{outcome:?}");
    assert_eq!(outcome.status, Some(200));
    let reports = reporter.wait_for(1, REPORT_WAIT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].classification, Classification::Violation);
    assert!(reports[0].response_started);
    assert!(!reports[0].body_sent);

    let follow_up = ScenarioDescriptor::new(
        "still_serving",
        Strategy::AbortDuringHandshake,
        payload::tools_list_request(),
    );
    let outcome = runner(&server)?.run(&follow_up).await;
    assert_eq!(outcome.status, Some(200), "server stopped serving: {outcome:?}");
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn patient_client_produces_a_clean_report(reporter: RecordingReporter) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_millis(50)).await?;

    let response = reqwest::Client::new()
        .post(server.url("/mcp"))
        .header(reqwest::header::ACCEPT, ssetrace::scenario::STREAMING_ACCEPT)
        .json(&payload::tool_call_request(SLOW_TOOL, json!({})))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await?;
    assert!(body.contains("Operation completed"), "{body}");

    let reports = reporter.wait_for(1, REPORT_WAIT).await;
    assert_eq!(reports[0].classification, Classification::Clean);
    assert_eq!(reports[0].termination, Termination::Returned);
    server.shutdown().await
}

#[rstest]
#[case::immediate(Strategy::Immediate)]
#[case::cancel_during_read(Strategy::CancelDuringRead)]
#[case::abort_during_handshake(Strategy::AbortDuringHandshake)]
#[tokio::test]
async fn disconnect_strategies_are_not_anomalous(
    reporter: RecordingReporter,
    #[case] strategy: Strategy,
) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_millis(500)).await?;
    let config = RunnerConfig {
        immediate_deadline: Duration::from_millis(100),
        ..RunnerConfig::default()
    };
    let runner = ScenarioRunner::with_config(Url::parse(&server.url("/mcp"))?, config)?;
    let descriptor = ScenarioDescriptor::new(
        strategy.label(),
        strategy,
        payload::tool_call_request(SLOW_TOOL, json!({})),
    );

    let outcome = runner.run(&descriptor).await;

    assert!(!outcome.is_anomalous(), "{outcome:?}");
    assert!(outcome.expected_signal_observed(), "{outcome:?}");
    server.shutdown().await
}

/// Methods that answer without suspending race the client's close. Either
/// verdict is acceptable; the server must keep serving and report each run.
#[rstest]
#[case::immediate_initialize(Strategy::Immediate, payload::initialize_request())]
#[case::cancel_tools_list(Strategy::CancelDuringRead, payload::tools_list_request())]
#[tokio::test]
async fn fast_methods_survive_an_early_disconnect(
    reporter: RecordingReporter,
    #[case] strategy: Strategy,
    #[case] request: serde_json::Value,
) -> TestResult {
    const RUNS: usize = 5;
    let server = tracked_app(&reporter, Duration::from_millis(50)).await?;
    let runner = runner(&server)?;
    let descriptor = ScenarioDescriptor::new(strategy.label(), strategy, request);

    for _ in 0..RUNS {
        let outcome = runner.run(&descriptor).await;
        assert!(!outcome.is_anomalous(), "{outcome:?}");
        assert_eq!(outcome.status, Some(200), "{outcome:?}");
    }

    let reports = reporter.wait_for(RUNS, REPORT_WAIT).await;
    assert_eq!(reports.len(), RUNS);
    for report in &reports {
        assert!(report.response_started, "{report:?}");
        assert!(
            matches!(
                report.classification,
                Classification::Violation | Classification::Clean
            ),
            "{report:?}"
        );
        assert_eq!(report.classification == Classification::Violation, !report.body_sent);
        assert_eq!(report.message_count, 1 + usize::from(report.body_sent));
        assert!(
            !matches!(report.termination, Termination::Panicked | Termination::Cancelled),
            "{report:?}"
        );
    }
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn cancel_window_opens_after_the_head(reporter: RecordingReporter) -> TestResult {
    let handler = TrackingLayer::with_reporter(reporter.clone()).wrap(ScriptedHandler::new(
        [LifecycleMessage::start(StatusCode::OK, HeaderMap::new())],
        Ending::AwaitDisconnect,
    ));
    let server = TestServer::spawn(handler).await?;
    let descriptor = ScenarioDescriptor::new(
        "cancel_during_read",
        Strategy::CancelDuringRead,
        payload::tools_list_request(),
    );

    let outcome = runner(&server)?.run(&descriptor).await;

    assert_eq!(outcome.status, Some(200), "{outcome:?}");
    assert_eq!(
        outcome.termination,
        ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Cancelled)
    );
    let reports = reporter.wait_for(1, REPORT_WAIT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].classification, Classification::Violation);
    assert_eq!(reports[0].termination, Termination::Returned);
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn ten_concurrent_immediate_disconnects_all_report(
    reporter: RecordingReporter,
) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_millis(500)).await?;
    let suite = ScenarioSuite::new(
        "immediate_burst",
        vec![SuiteStep::Burst {
            descriptor: ScenarioDescriptor::new(
                "immediate",
                Strategy::Immediate,
                payload::tool_call_request(SLOW_TOOL, json!({})),
            ),
            count: 10,
        }],
    )
    .with_settle_delay(Duration::ZERO);

    let report = suite.run(&runner(&server)?).await;

    assert_eq!(report.len(), 10);
    assert_eq!(report.expected_count(), 10);
    assert!(report.anomalies().is_empty(), "{:?}", report.anomalies());
    assert!(report.get("01-immediate#1").is_some());
    assert!(report.get("01-immediate#10").is_some());
    let reports = reporter.wait_for(10, REPORT_WAIT).await;
    assert_eq!(reports.len(), 10);
    assert!(
        reports
            .iter()
            .all(|r| r.classification == Classification::Violation),
        "{reports:?}"
    );
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn burst_suite_records_every_instance(reporter: RecordingReporter) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_millis(50)).await?;
    let descriptor = ScenarioDescriptor::new(
        "greeting_burst",
        Strategy::DelayedMs(10),
        payload::tool_call_request(GREETING_TOOL, json!({"name": "Ada"})),
    );
    let suite = ScenarioSuite::new(
        "burst",
        vec![
            SuiteStep::Single(ScenarioDescriptor::new(
                "initialize",
                Strategy::Immediate,
                payload::initialize_request(),
            )),
            SuiteStep::Burst {
                descriptor,
                count: 10,
            },
        ],
    )
    .with_settle_delay(Duration::ZERO);

    let report = suite.run(&runner(&server)?).await;

    assert_eq!(report.len(), suite.expected_entries());
    assert_eq!(report.len(), 11);
    assert!(report.anomalies().is_empty(), "{:?}", report.anomalies());
    assert!(report.get("02-greeting_burst#10").is_some());
    let reports = reporter.wait_for(11, REPORT_WAIT).await;
    assert_eq!(reports.len(), 11);
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn unknown_path_is_served_a_404(reporter: RecordingReporter) -> TestResult {
    let server = tracked_app(&reporter, Duration::from_millis(50)).await?;
    let runner = ScenarioRunner::new(Url::parse(&server.url("/elsewhere"))?)?;
    let descriptor = ScenarioDescriptor::new(
        "lost",
        Strategy::AbortDuringHandshake,
        payload::initialize_request(),
    );

    let outcome = runner.run(&descriptor).await;

    assert_eq!(outcome.status, Some(404));
    let reports = reporter.wait_for(1, REPORT_WAIT).await;
    assert_eq!(reports[0].classification, Classification::Clean);
    assert_eq!(reports[0].path, "/elsewhere");
    server.shutdown().await
}

#[rstest]
#[tokio::test]
async fn shutdown_cancels_in_flight_requests(reporter: RecordingReporter) -> TestResult {
    let handler = TrackingLayer::with_reporter(reporter.clone()).wrap(ScriptedHandler::new(
        [LifecycleMessage::start(StatusCode::OK, HeaderMap::new())],
        Ending::Hang,
    ));
    let server = TestServer::spawn(handler).await?;

    let response = reqwest::Client::new()
        .post(server.url("/mcp"))
        .body("{}")
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    tokio::time::timeout(REPORT_WAIT, server.shutdown()).await??;

    let reports = reporter.wait_for(1, REPORT_WAIT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].classification, Classification::Violation);
    assert_eq!(reports[0].termination, Termination::Cancelled);
    drop(response);
    Ok(())
}
