use serde::Serialize;
use serde_json::Value;

/// UI-facing update chunk.
///
/// Tag and field spellings match the payload the desktop shell forwards
/// to its renderer verbatim, so a chunk serializes straight onto the
/// in-process channel without a mapping layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum UiChunk {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "start-step")]
    StartStep,
    #[serde(rename = "text-start")]
    TextStart { id: String },
    #[serde(rename = "text-delta")]
    TextDelta { id: String, delta: String },
    #[serde(rename = "text-end")]
    TextEnd { id: String },
    #[serde(rename = "tool-input-start")]
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    #[serde(rename = "tool-input-delta")]
    ToolInputDelta {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "inputTextDelta")]
        input_text_delta: String,
    },
    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    #[serde(rename = "tool-output-available")]
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        output: Value,
    },
    #[serde(rename = "tool-output-error")]
    ToolOutputError {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "errorText")]
        error_text: String,
    },
    #[serde(rename = "message-metadata")]
    MessageMetadata {
        #[serde(rename = "messageMetadata")]
        metadata: RunMetadata,
    },
    #[serde(rename = "system-Compact")]
    SystemCompact {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        state: CompactState,
    },
    #[serde(rename = "finish-step")]
    FinishStep,
    #[serde(rename = "finish")]
    Finish {
        #[serde(rename = "messageMetadata")]
        metadata: RunMetadata,
    },
}

impl UiChunk {
    /// Returns the tool-call identifier carried by this chunk, if any.
    #[must_use]
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolInputStart { tool_call_id, .. }
            | Self::ToolInputDelta { tool_call_id, .. }
            | Self::ToolInputAvailable { tool_call_id, .. }
            | Self::ToolOutputAvailable { tool_call_id, .. }
            | Self::ToolOutputError { tool_call_id, .. }
            | Self::SystemCompact { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Returns true when this chunk terminates the run's chunk stream.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// Lifecycle state of a compaction pseudo-tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompactState {
    #[serde(rename = "input-streaming")]
    InputStreaming,
    #[serde(rename = "output-available")]
    OutputAvailable,
}

/// Metadata attached to `message-metadata` and `finish` chunks.
///
/// Early checkpoint emissions carry only `sdkMessageUuid`; the terminal
/// emission fills the accounting fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_message_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_text_id: Option<String>,
}

impl RunMetadata {
    /// Checkpoint-only metadata carrying a session message uuid.
    #[must_use]
    pub fn with_sdk_message_uuid(uuid: impl Into<String>) -> Self {
        Self {
            sdk_message_uuid: Some(uuid.into()),
            ..Self::default()
        }
    }
}
