use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Run status as reported by the remote run-listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// A run in one of these states still owns its thread; a second run
    /// cannot be created until it leaves them.
    pub fn is_non_terminal(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::InProgress | Self::RequiresAction | Self::Cancelling
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub status: RunStatus,
}

/// A function invocation requested by the remote run. `arguments` is a
/// JSON-encoded string and is untrusted input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub arguments: String,
}

/// One entry in a `submit_tool_outputs` batch. `output` is the
/// JSON-serialized result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

impl ToolOutput {
    pub fn success(tool_call_id: impl Into<String>, data: &Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: data.to_string(),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        let body = serde_json::json!({
            "status": "failure",
            "message": message.into(),
        });
        Self {
            tool_call_id: tool_call_id.into(),
            output: body.to_string(),
        }
    }
}

/// First-class view of one unit from the remote run event stream.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunCreated {
        run_id: String,
    },
    MessageDelta {
        content: Vec<DeltaContent>,
    },
    RequiresAction {
        run_id: String,
        action: RequiredAction,
    },
    RunCompleted,
    RunFailed {
        message: Option<String>,
    },
    Unknown {
        event: String,
    },
}

#[derive(Debug, Clone)]
pub enum RequiredAction {
    SubmitToolOutputs { tool_calls: Vec<ToolCall> },
    Other { action_type: String },
}

#[derive(Debug, Clone)]
pub enum DeltaContent {
    Text { value: String },
    Other,
}

// Wire shapes for the event payloads we decode. Only the fields the relay
// consumes are modeled; everything else is ignored.

#[derive(Debug, Deserialize)]
pub(crate) struct RunObject {
    pub id: String,
    #[serde(default)]
    pub required_action: Option<RequiredActionObject>,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequiredActionObject {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputsObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitToolOutputsObject {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastError {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageDeltaObject {
    pub delta: MessageDeltaBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<DeltaContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum DeltaContentPart {
    Text { text: DeltaText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeltaText {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListRunsResponse {
    #[serde(default)]
    pub data: Vec<RunSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_terminal_statuses() {
        assert!(RunStatus::Queued.is_non_terminal());
        assert!(RunStatus::InProgress.is_non_terminal());
        assert!(RunStatus::RequiresAction.is_non_terminal());
        assert!(RunStatus::Cancelling.is_non_terminal());
        assert!(!RunStatus::Completed.is_non_terminal());
        assert!(!RunStatus::Failed.is_non_terminal());
        assert!(!RunStatus::Cancelled.is_non_terminal());
    }

    #[test]
    fn unlisted_status_deserializes_to_unknown() {
        let status: RunStatus = serde_json::from_str("\"some_future_state\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_non_terminal());
    }

    #[test]
    fn failure_output_encodes_structured_marker() {
        let output = ToolOutput::failure("call_1", "Invalid function arguments");
        let body: Value = serde_json::from_str(&output.output).unwrap();
        assert_eq!(body["status"], "failure");
        assert_eq!(body["message"], "Invalid function arguments");
    }

    #[test]
    fn success_output_echoes_data_exactly() {
        let data = serde_json::json!({"status": "success", "value": 42});
        let output = ToolOutput::success("call_2", &data);
        let body: Value = serde_json::from_str(&output.output).unwrap();
        assert_eq!(body, data);
    }
}
