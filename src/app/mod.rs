//! Streaming JSON-RPC application served behind the tracking interceptor.
//!
//! [`McpApp`] answers `initialize`, `tools/list` and `tools/call` on a single
//! endpoint. When the client accepts both JSON and server-sent events the
//! response starts immediately as an event stream. The request is then handed
//! to a writer task, which dispatches it and passes the encoded event back
//! over a channel. A client that leaves before the event arrives makes the
//! app return without sending any body, which is the behaviour the tracking
//! interceptor exists to flag. Setting [`AppConfig::close_on_disconnect`]
//! makes it send an empty terminating body instead.

pub mod jsonrpc;
pub mod tools;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info};

pub use self::{
    jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
    tools::{ToolError, ToolRegistry, ToolSpec},
};
use crate::{
    error::{HandlerError, TransportError},
    lifecycle::LifecycleMessage,
    middleware::Handler,
    scope::Scope,
    transport::Transport,
};

/// Path served when none is configured.
pub const DEFAULT_ENDPOINT: &str = "/mcp";
/// Protocol version reported when the client does not send one.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";

/// Application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the JSON-RPC endpoint.
    pub endpoint: String,
    /// How long `slow_operation` sleeps.
    pub slow_delay: Duration,
    /// Send an empty terminating body when the client disconnects mid-stream.
    pub close_on_disconnect: bool,
    /// Name reported in `initialize`.
    pub server_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            slow_delay: Duration::from_secs(2),
            close_on_disconnect: false,
            server_name: env!("CARGO_PKG_NAME").to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseMode {
    EventStream,
    Json,
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// JSON-RPC handler exposing the registered tools.
#[derive(Debug)]
pub struct McpApp {
    session: Arc<Session>,
}

/// State shared between the handler and its event writer tasks.
#[derive(Debug)]
struct Session {
    config: AppConfig,
    tools: ToolRegistry,
}

impl Default for McpApp {
    fn default() -> Self { Self::new(AppConfig::default()) }
}

impl McpApp {
    /// App with the default greeting and slow tools.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let tools = ToolRegistry::with_defaults(config.slow_delay);
        Self::with_tools(config, tools)
    }

    #[must_use]
    pub fn with_tools(config: AppConfig, tools: ToolRegistry) -> Self {
        Self {
            session: Arc::new(Session { config, tools }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig { &self.session.config }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry { &self.session.tools }

    async fn stream_events(
        &self,
        id: Value,
        request: JsonRpcRequest,
        transport: &mut dyn Transport,
    ) -> Result<(), HandlerError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        transport
            .send(LifecycleMessage::start(StatusCode::OK, headers))
            .await?;

        let (event_tx, event_rx) = oneshot::channel();
        let session = Arc::clone(&self.session);
        // Aborted when the handler returns or is dropped.
        let _writer = AbortOnDropHandle::new(tokio::spawn(async move {
            let response = session.dispatch(id, request).await;
            let _ = event_tx.send(encode_event(&response));
        }));

        let event = tokio::select! {
            biased;
            () = transport.disconnected() => None,
            event = event_rx => Some(event),
        };
        let Some(event) = event else {
            debug!("client disconnected before the first event");
            if self.session.config.close_on_disconnect {
                ignore_disconnect(transport.send(LifecycleMessage::end()).await)?;
            }
            return Ok(());
        };

        let event = event.map_err(|_| HandlerError::application("event writer stopped"))??;
        transport.send(LifecycleMessage::body(event, false)).await?;
        Ok(())
    }

    async fn respond_json(
        &self,
        id: Value,
        request: JsonRpcRequest,
        transport: &mut dyn Transport,
    ) -> Result<(), HandlerError> {
        let response = tokio::select! {
            response = self.session.dispatch(id, request) => Some(response),
            () = transport.disconnected() => None,
        };
        let Some(response) = response else {
            debug!("client disconnected before the response started");
            return Ok(());
        };
        let body = serde_json::to_vec(&response)
            .map_err(|err| HandlerError::application(err.to_string()))?;
        respond(transport, StatusCode::OK, Some(JSON), body).await
    }
}

impl Session {
    async fn dispatch(&self, id: Value, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize(&request.params)),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(request.params).await,
            "ping" => Ok(json!({})),
            other => Err(JsonRpcError::method_not_found(other)),
        };
        JsonRpcResponse::from_result(id, result)
    }

    fn initialize(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {
                "name": self.config.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<_> = self.tools.specs().collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let CallParams { name, arguments } = serde_json::from_value(params)
            .map_err(|err| JsonRpcError::invalid_params(err.to_string()))?;
        let text = self
            .tools
            .call(&name, arguments)
            .map_err(|err| JsonRpcError::invalid_params(err.to_string()))?
            .await
            .map_err(|err| JsonRpcError::invalid_params(err.to_string()))?;
        Ok(json!({
            "content": [{"type": "text", "text": text}],
            "isError": false
        }))
    }
}

#[async_trait]
impl Handler for McpApp {
    async fn call(&self, scope: Scope, transport: &mut dyn Transport) -> Result<(), HandlerError> {
        if !scope.is_http() {
            return Ok(());
        }
        if scope.path() != self.session.config.endpoint {
            return respond(transport, StatusCode::NOT_FOUND, None, "Not Found").await;
        }
        if *scope.method() != Method::POST {
            return respond(
                transport,
                StatusCode::METHOD_NOT_ALLOWED,
                None,
                "Method Not Allowed",
            )
            .await;
        }
        let mode = match (scope.accepts(JSON), scope.accepts(EVENT_STREAM)) {
            (true, true) => ResponseMode::EventStream,
            (true, false) => ResponseMode::Json,
            _ => {
                return respond(
                    transport,
                    StatusCode::NOT_ACCEPTABLE,
                    None,
                    "Not Acceptable: client must accept application/json",
                )
                .await;
            }
        };

        let request = match serde_json::from_slice::<JsonRpcRequest>(scope.body()) {
            Ok(request) if request.jsonrpc == jsonrpc::JSONRPC_VERSION => request,
            Ok(request) => {
                let error = JsonRpcError::invalid_request(format!(
                    "unsupported jsonrpc version {:?}",
                    request.jsonrpc
                ));
                return reject(transport, request.id.unwrap_or(Value::Null), error).await;
            }
            Err(err) => {
                return reject(transport, Value::Null, JsonRpcError::parse_error(err.to_string()))
                    .await;
            }
        };
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "notification accepted");
            return respond(transport, StatusCode::ACCEPTED, None, Bytes::new()).await;
        };

        info!(method = %request.method, mode = ?mode, path = scope.path(), "dispatching request");
        match mode {
            ResponseMode::EventStream => self.stream_events(id, request, transport).await,
            ResponseMode::Json => self.respond_json(id, request, transport).await,
        }
    }
}

/// Frame a response as a single server-sent event.
fn encode_event(response: &JsonRpcResponse) -> Result<Bytes, HandlerError> {
    let data =
        serde_json::to_string(response).map_err(|err| HandlerError::application(err.to_string()))?;
    Ok(Bytes::from(format!("event: message\ndata: {data}\n\n")))
}

async fn reject(
    transport: &mut dyn Transport,
    id: Value,
    error: JsonRpcError,
) -> Result<(), HandlerError> {
    let body = serde_json::to_vec(&JsonRpcResponse::failure(id, error))
        .map_err(|err| HandlerError::application(err.to_string()))?;
    respond(transport, StatusCode::BAD_REQUEST, Some(JSON), body).await
}

/// Send a complete response as one start and one terminating body.
async fn respond(
    transport: &mut dyn Transport,
    status: StatusCode,
    content_type: Option<&'static str>,
    body: impl Into<Bytes>,
) -> Result<(), HandlerError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type.unwrap_or("text/plain; charset=utf-8")),
    );
    transport
        .send(LifecycleMessage::start(status, headers))
        .await?;
    transport.send(LifecycleMessage::body(body, false)).await?;
    Ok(())
}

fn ignore_disconnect(result: Result<(), TransportError>) -> Result<(), TransportError> {
    match result {
        Err(TransportError::Disconnected) => Ok(()),
        other => other,
    }
}
