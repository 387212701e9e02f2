use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use assistant_relay_assistants_client::{ToolCall, ToolOutput};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Reserved argument key the dispatcher injects before invoking a handler.
pub const SESSION_ID_KEY: &str = "session_id";

const INVALID_ARGUMENTS: &str = "Invalid function arguments";
const FUNCTION_NOT_FOUND: &str = "Function not found.";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ToolError(pub String);

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// A callable tool. Receives the parsed argument object (with
/// [`SESSION_ID_KEY`] injected) and returns a `{"data": ...}`-shaped value
/// whose `data` member becomes the success output.
pub trait ToolHandler: Send + Sync + 'static {
    fn call(&self, arguments: Value) -> HandlerFuture<'_>;
}

impl<F> ToolHandler for F
where
    F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
{
    fn call(&self, arguments: Value) -> HandlerFuture<'_> {
        let result = self(arguments);
        Box::pin(async move { result })
    }
}

/// One named collection of handlers. Sources are probed in registration
/// order and the first source holding the function wins; later sources are
/// never consulted for that call.
pub struct HandlerSource {
    name: &'static str,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl HandlerSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: HashMap::new(),
        }
    }

    pub fn with(mut self, function: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(function.into(), handler);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub struct ToolDispatcher {
    sources: Vec<HandlerSource>,
}

impl ToolDispatcher {
    pub fn new(sources: Vec<HandlerSource>) -> Self {
        Self { sources }
    }

    /// Resolve and invoke the handler for one tool call.
    ///
    /// Never fails: every failure class (unparseable arguments, unknown
    /// function, handler error) is absorbed into a failure [`ToolOutput`]
    /// so the remote run's protocol contract stays satisfied.
    pub async fn dispatch(&self, session_id: &str, call: &ToolCall) -> ToolOutput {
        let mut arguments = match parse_arguments(&call.function.arguments) {
            Some(object) => object,
            None => {
                tracing::warn!(
                    function = %call.function.name,
                    "tool call carried unparseable arguments"
                );
                return ToolOutput::failure(&call.id, INVALID_ARGUMENTS);
            }
        };
        arguments.insert(
            SESSION_ID_KEY.to_string(),
            Value::String(session_id.to_string()),
        );

        let resolved = self.sources.iter().find_map(|source| {
            source
                .handlers
                .get(&call.function.name)
                .map(|handler| (source.name, handler))
        });
        let (source_name, handler) = match resolved {
            Some(found) => found,
            None => {
                tracing::warn!(function = %call.function.name, "no handler source matched");
                return ToolOutput::failure(&call.id, FUNCTION_NOT_FOUND);
            }
        };

        tracing::debug!(
            function = %call.function.name,
            source = source_name,
            "dispatching tool call"
        );
        match handler.call(Value::Object(arguments)).await {
            Ok(value) => {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                ToolOutput::success(&call.id, &data)
            }
            Err(err) => ToolOutput::failure(&call.id, err.0),
        }
    }
}

fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Handlers the binary ships so the relay is exercisable end to end.
/// Library users compose their own source list instead.
pub fn builtin_sources() -> Vec<HandlerSource> {
    let get_time: Arc<dyn ToolHandler> = Arc::new(|_arguments: Value| -> Result<Value, ToolError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ToolError(err.to_string()))?;
        Ok(json!({ "data": { "epoch_seconds": now.as_secs() } }))
    });
    vec![HandlerSource::new("internal").with("get_time", get_time)]
}
