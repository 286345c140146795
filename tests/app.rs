//! Tests for the streaming JSON-RPC application.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use ssetrace::{
    Classification,
    Handler,
    LifecycleMessage,
    Scope,
    TrackingLayer,
    app::{
        AppConfig,
        McpApp,
        tools::{GREETING_TOOL, SLOW_TOOL},
    },
    lifecycle::MessageKind,
    scenario::payload,
};
use ssetrace_testing::{MemoryTransport, RecordingReporter};

const BOTH: &str = "application/json, text/event-stream";

fn scope(method: Method, path: &str, accept: Option<&'static str>, body: &Value) -> Scope {
    let mut headers = HeaderMap::new();
    if let Some(accept) = accept {
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
    }
    let body = serde_json::to_vec(body).expect("serialise body");
    Scope::http(method, path, headers, Bytes::from(body))
}

fn post(accept: &'static str, body: &Value) -> Scope { scope(Method::POST, "/mcp", Some(accept), body) }

#[fixture]
fn app() -> McpApp {
    McpApp::new(AppConfig {
        slow_delay: Duration::from_secs(1),
        ..AppConfig::default()
    })
}

async fn serve(app: &McpApp, scope: Scope) -> MemoryTransport {
    let mut transport = MemoryTransport::new();
    app.call(scope, &mut transport)
        .await
        .expect("app handles the request");
    transport
}

fn sse_payload(transport: &MemoryTransport) -> Value {
    let body = String::from_utf8(transport.body()).expect("utf-8 body");
    let data = body
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("event carries data");
    serde_json::from_str(data).expect("event data is json")
}

#[rstest]
#[case::unknown_path(scope(Method::POST, "/other", Some(BOTH), &Value::Null), StatusCode::NOT_FOUND)]
#[case::wrong_method(scope(Method::GET, "/mcp", Some(BOTH), &Value::Null), StatusCode::METHOD_NOT_ALLOWED)]
#[case::no_accept(scope(Method::POST, "/mcp", None, &payload::initialize_request()), StatusCode::NOT_ACCEPTABLE)]
#[case::sse_only(post("text/event-stream", &payload::initialize_request()), StatusCode::NOT_ACCEPTABLE)]
#[case::bad_json(scope(Method::POST, "/mcp", Some(BOTH), &json!("not an object")), StatusCode::BAD_REQUEST)]
#[case::bad_version(post(BOTH, &json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})), StatusCode::BAD_REQUEST)]
#[case::notification(post(BOTH, &json!({"jsonrpc": "2.0", "method": "notifications/initialized"})), StatusCode::ACCEPTED)]
#[tokio::test]
async fn requests_outside_the_happy_path_complete_in_one_body(
    app: McpApp,
    #[case] scope: Scope,
    #[case] status: StatusCode,
) {
    let transport = serve(&app, scope).await;

    assert_eq!(transport.status(), Some(status));
    assert_eq!(transport.kinds(), [MessageKind::Start, MessageKind::Body]);
    assert!(transport.messages()[1].is_terminal());
}

#[rstest]
#[tokio::test]
async fn parse_errors_carry_a_json_rpc_error(app: McpApp) {
    let transport = serve(&app, post(BOTH, &json!("nope"))).await;

    let body: Value = serde_json::from_slice(&transport.body()).expect("json error body");
    assert_eq!(body["error"]["code"], json!(-32700));
    assert_eq!(body["id"], Value::Null);
}

#[rstest]
#[tokio::test]
async fn json_mode_answers_with_a_single_document(app: McpApp) {
    let transport = serve(&app, post("application/json", &payload::tools_list_request())).await;

    assert_eq!(transport.status(), Some(StatusCode::OK));
    assert_eq!(content_type(&transport), "application/json");
    let body: Value = serde_json::from_slice(&transport.body()).expect("json body");
    let names: Vec<_> = body["result"]["tools"]
        .as_array()
        .expect("tool list")
        .iter()
        .map(|t| t["name"].clone())
        .collect();
    assert_eq!(names, [json!(GREETING_TOOL), json!(SLOW_TOOL)]);
}

fn content_type(transport: &MemoryTransport) -> String {
    transport
        .messages()
        .iter()
        .find_map(|message| match message {
            LifecycleMessage::Start { headers, .. } => headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            LifecycleMessage::Body { .. } => None,
        })
        .unwrap_or_default()
}

#[rstest]
#[tokio::test]
async fn event_stream_mode_sends_one_terminal_event(app: McpApp) {
    let request = payload::tool_call_request(GREETING_TOOL, json!({"name": "Ada"}));
    let transport = serve(&app, post(BOTH, &request)).await;

    assert_eq!(transport.kinds(), [MessageKind::Start, MessageKind::Body]);
    assert_eq!(content_type(&transport), "text/event-stream");
    let body = String::from_utf8(transport.body()).expect("utf-8");
    assert!(body.starts_with("event: message\n"));
    assert!(body.ends_with("\n\n"));
    let event = sse_payload(&transport);
    assert_eq!(event["result"]["content"][0]["text"], "Hello, Ada!");
    assert_eq!(event["id"], json!(1));
}

#[rstest]
#[tokio::test]
async fn initialize_echoes_the_requested_protocol_version(app: McpApp) {
    let transport = serve(&app, post(BOTH, &payload::initialize_request())).await;

    let event = sse_payload(&transport);
    assert_eq!(event["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(event["result"]["serverInfo"]["name"], "ssetrace");
}

#[rstest]
#[tokio::test]
async fn unknown_method_is_reported_in_the_event(app: McpApp) {
    let request = json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"});
    let transport = serve(&app, post(BOTH, &request)).await;

    let event = sse_payload(&transport);
    assert_eq!(event["error"]["code"], json!(-32601));
    assert_eq!(event["id"], json!(7));
}

#[rstest]
#[case::leave_open(false, Classification::Violation)]
#[case::close(true, Classification::Clean)]
#[tokio::test(start_paused = true)]
async fn client_leaving_mid_stream(
    #[case] close_on_disconnect: bool,
    #[case] classification: Classification,
) {
    let reporter = RecordingReporter::default();
    let app = TrackingLayer::with_reporter(reporter.clone()).wrap(McpApp::new(AppConfig {
        slow_delay: Duration::from_secs(1),
        close_on_disconnect,
        ..AppConfig::default()
    }));
    let (mut transport, client) = MemoryTransport::with_disconnect();
    let request = payload::tool_call_request(SLOW_TOOL, json!({}));

    let (result, ()) = tokio::join!(app.call(post(BOTH, &request), &mut transport), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        client.disconnect();
    });

    result.expect("app returns quietly when the client leaves");
    // The closing body is observed by the tracker even though the gone
    // client never receives it.
    assert_eq!(transport.kinds(), [MessageKind::Start]);
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].classification, classification);
}

/// The event for a method that never suspends is written from another task,
/// so a client leaving right after the start still wins the race.
#[rstest]
#[case::initialize(payload::initialize_request())]
#[case::tools_list(payload::tools_list_request())]
#[tokio::test]
async fn fast_methods_leave_a_window_after_the_start(#[case] request: Value) {
    let reporter = RecordingReporter::default();
    let app = TrackingLayer::with_reporter(reporter.clone()).wrap(app());
    let (mut transport, client) = MemoryTransport::with_disconnect();

    let (result, ()) = tokio::join!(app.call(post(BOTH, &request), &mut transport), async {
        client.disconnect();
    });

    result.expect("app returns quietly when the client leaves");
    assert_eq!(transport.kinds(), [MessageKind::Start]);
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].classification, Classification::Violation);
    assert_eq!(reports[0].message_count, 1);
    assert!(!reports[0].body_sent);
}

#[rstest]
#[tokio::test]
async fn fast_methods_still_answer_a_patient_client(app: McpApp) {
    let transport = serve(&app, post(BOTH, &payload::tools_list_request())).await;

    assert_eq!(transport.kinds(), [MessageKind::Start, MessageKind::Body]);
    let event = sse_payload(&transport);
    assert_eq!(event["result"]["tools"][0]["name"], GREETING_TOOL);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn json_mode_sends_nothing_when_the_client_leaves(app: McpApp) {
    let (mut transport, client) = MemoryTransport::with_disconnect();
    let request = payload::tool_call_request(SLOW_TOOL, json!({}));

    let (result, ()) = tokio::join!(
        app.call(post("application/json", &request), &mut transport),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            client.disconnect();
        }
    );

    result.expect("app returns quietly");
    assert!(transport.messages().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_tool_completes_for_a_patient_client(app: McpApp) {
    let request = payload::tool_call_request(SLOW_TOOL, json!({}));
    let transport = serve(&app, post(BOTH, &request)).await;

    let event = sse_payload(&transport);
    assert_eq!(event["result"]["content"][0]["text"], "Operation completed");
}
