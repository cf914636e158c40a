use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One unit of the agent session protocol, tagged by `type`.
///
/// The stream carries two overlapping channels for assistant output:
/// token-level `stream_event` deltas and complete `assistant` replay
/// messages. Both are modeled here verbatim; reconciliation is the
/// consumer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEnvelope {
    StreamEvent {
        event: StreamEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        #[serde(
            default,
            deserialize_with = "double_option",
            skip_serializing_if = "Option::is_none"
        )]
        parent_tool_use_id: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Assistant {
        message: AssistantMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        #[serde(
            default,
            deserialize_with = "double_option",
            skip_serializing_if = "Option::is_none"
        )]
        parent_tool_use_id: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    User {
        message: UserMessage,
        /// Richer structured result some hosts attach next to the raw
        /// `tool_result` block content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        #[serde(
            default,
            deserialize_with = "double_option",
            skip_serializing_if = "Option::is_none"
        )]
        parent_tool_use_id: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
    },
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
    },
    /// Unrecognized envelope type retained so unknown records parse
    /// instead of failing the whole stream.
    #[serde(other)]
    Unknown,
}

impl SessionEnvelope {
    /// Returns the session checkpoint marker carried by this envelope.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::StreamEvent { uuid, .. }
            | Self::Assistant { uuid, .. }
            | Self::User { uuid, .. }
            | Self::System { uuid, .. }
            | Self::Result { uuid, .. } => uuid.as_deref(),
            Self::Unknown => None,
        }
    }

    /// Returns the nested-scope update carried by this envelope.
    ///
    /// `None` means the field was absent (keep the previous scope);
    /// `Some(None)` means an explicit null cleared the scope.
    #[must_use]
    pub fn parent_scope_update(&self) -> Option<Option<&str>> {
        match self {
            Self::StreamEvent {
                parent_tool_use_id, ..
            }
            | Self::Assistant {
                parent_tool_use_id, ..
            }
            | Self::User {
                parent_tool_use_id, ..
            } => parent_tool_use_id.as_ref().map(Option::as_deref),
            Self::System { .. } | Self::Result { .. } | Self::Unknown => None,
        }
    }
}

/// Token-level event nested inside a `stream_event` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
        delta: ContentDelta,
    },
    ContentBlockStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
    },
    MessageDelta,
    MessageStop,
    #[serde(other)]
    Other,
}

/// Content block appearing in assistant and user messages and in
/// `content_block_start` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
    },
    #[serde(other)]
    Other,
}

/// Incremental delta nested inside a `content_block_delta` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta {
        #[serde(default)]
        text: String,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    SignatureDelta {
        #[serde(default)]
        signature: String,
    },
    #[serde(other)]
    Other,
}

/// Body of an `assistant` replay envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Body of a `user` envelope carrying tool results back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: UserContent,
}

/// User message content arrives either as a plain string or a block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for UserContent {
    fn default() -> Self {
        Self::Blocks(Vec::new())
    }
}

impl UserContent {
    /// Returns the structured blocks, treating plain text as empty.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Text(_) => &[],
            Self::Blocks(blocks) => blocks,
        }
    }
}

/// Token accounting attached to assistant messages and terminal results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

// Distinguishes a field that was present-but-null from one that was
// absent entirely; `#[serde(default)]` covers the absent case.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
