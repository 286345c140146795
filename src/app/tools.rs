//! Tool registry for the `tools/list` and `tools/call` methods.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc, time::Duration};

use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Name of the synchronous greeting tool.
pub const GREETING_TOOL: &str = "get_greeting";
/// Name of the artificially slow tool.
pub const SLOW_TOOL: &str = "slow_operation";

/// Future returned by a tool invocation.
pub type ToolFuture = BoxFuture<'static, Result<String, ToolError>>;

type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Errors raised while resolving or running a tool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Metadata advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

struct RegisteredTool {
    spec: ToolSpec,
    run: ToolFn,
}

/// Named tools callable through `tools/call`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Registry holding the greeting tool and a slow tool sleeping for
    /// `slow_delay`.
    #[must_use]
    pub fn with_defaults(slow_delay: Duration) -> Self {
        let mut registry = Self::new();
        registry.register_sync(
            ToolSpec::new(
                GREETING_TOOL,
                "Get a greeting for the given name.",
                json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }),
            ),
            |args| {
                let name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::InvalidArguments("`name` must be a string".into()))?;
                Ok(format!("Hello, {name}!"))
            },
        );
        registry.register_async(
            ToolSpec::new(
                SLOW_TOOL,
                "A slow operation that takes time to respond.",
                json!({"type": "object", "properties": {}}),
            ),
            move |_| async move {
                tokio::time::sleep(slow_delay).await;
                Ok("Operation completed".to_owned())
            },
        );
        registry
    }

    /// Register a tool that computes its result without suspending.
    pub fn register_sync<F>(&mut self, spec: ToolSpec, tool: F)
    where
        F: Fn(&Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.insert(spec, Arc::new(move |args| future::ready(tool(&args)).boxed()));
    }

    /// Register a tool returning a future.
    pub fn register_async<F, Fut>(&mut self, spec: ToolSpec, tool: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.insert(spec, Arc::new(move |args| tool(args).boxed()));
    }

    fn insert(&mut self, spec: ToolSpec, run: ToolFn) {
        self.tools
            .insert(spec.name.clone(), RegisteredTool { spec, run });
    }

    /// Specs of every registered tool, ordered by name.
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> { self.tools.values().map(|t| &t.spec) }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.tools.contains_key(name) }

    /// Start the tool called `name` with `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Unknown`] if no such tool is registered.
    pub fn call(&self, name: &str, arguments: Value) -> Result<ToolFuture, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_owned()))?;
        Ok((tool.run)(arguments))
    }
}
