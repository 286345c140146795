//! Request payloads sent by the stock scenarios.

use serde_json::{Value, json};

use crate::app::{JsonRpcRequest, PROTOCOL_VERSION};

fn to_value(request: &JsonRpcRequest) -> Value {
    serde_json::to_value(request).unwrap_or(Value::Null)
}

/// `initialize` as sent by a freshly connecting client.
#[must_use]
pub fn initialize_request() -> Value {
    to_value(&JsonRpcRequest::new(
        1,
        "initialize",
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "ssetrace-probe", "version": env!("CARGO_PKG_VERSION")},
        }),
    ))
}

/// `tools/list`, which the server answers without suspending.
#[must_use]
pub fn tools_list_request() -> Value { to_value(&JsonRpcRequest::new(1, "tools/list", json!({}))) }

/// `tools/call` for `name` with `arguments`.
#[must_use]
pub fn tool_call_request(name: &str, arguments: Value) -> Value {
    to_value(&JsonRpcRequest::new(
        1,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
    ))
}
