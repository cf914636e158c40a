//! Reconciliation state machine between the agent session stream and the
//! renderer's chunk protocol.
//!
//! One [`Transducer`] is created per agent run and fed envelopes in
//! strict arrival order. Each call synchronously returns the finite,
//! ordered chunk sequence for that envelope; the instance owns no
//! background work and is discarded when the run ends or is aborted.
//! Content can arrive twice, once as token-level deltas and again inside
//! a replayed complete message; the emitted-id ledger keeps each logical
//! block rendered exactly once.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use agent_stream::{
    AssistantMessage, ContentBlock, ContentDelta, SessionEnvelope, StreamEvent, Usage, UserMessage,
};
use serde_json::{json, Value};

use crate::chunk::{CompactState, RunMetadata, UiChunk};

/// Reserved tool name under which extended-thinking blocks are rendered,
/// so the UI reuses its existing tool presentation for them.
pub const THINKING_TOOL_NAME: &str = "Thinking";

/// Ledger key marking that a thinking block already finished streaming.
///
/// Deliberately a single global key rather than per-block identity: a
/// turn with more than one thinking block only protects the first from
/// duplicate replay. Kept as-is for parity with the host application;
/// `tests/thinking_blocks.rs` pins the boundary case.
const THINKING_STREAMED: &str = "__thinking_streamed__";

#[derive(Debug)]
struct ToolAccumulator {
    id: String,
    name: String,
    input_json: String,
}

#[derive(Debug)]
struct ThinkingAccumulator {
    id: String,
    text: String,
}

/// Stateful envelope-to-chunk transducer for one agent run.
#[derive(Debug)]
pub struct Transducer {
    started: bool,
    started_at: Instant,
    last_uuid: Option<String>,
    parent_tool_id: Option<String>,
    open_text_id: Option<String>,
    last_text_id: Option<String>,
    text_seq: u64,
    tool: Option<ToolAccumulator>,
    thinking: Option<ThinkingAccumulator>,
    tool_ids: HashMap<String, String>,
    emitted: HashSet<String>,
    compaction: Option<String>,
    ephemeral_seq: u64,
}

impl Default for Transducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transducer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: false,
            started_at: Instant::now(),
            last_uuid: None,
            parent_tool_id: None,
            open_text_id: None,
            last_text_id: None,
            text_seq: 0,
            tool: None,
            thinking: None,
            tool_ids: HashMap::new(),
            emitted: HashSet::new(),
            compaction: None,
            ephemeral_seq: 0,
        }
    }

    /// Processes one envelope and returns its ordered chunk sequence.
    ///
    /// The very first call prepends `start` and `start-step`. A changed
    /// `uuid` emits a checkpoint `message-metadata` before any
    /// type-specific handling, so a caller cancelling mid-envelope still
    /// holds a rollback marker.
    pub fn handle_envelope(&mut self, envelope: &SessionEnvelope) -> Vec<UiChunk> {
        let mut out = Vec::new();

        if !self.started {
            self.started = true;
            out.push(UiChunk::Start);
            out.push(UiChunk::StartStep);
        }

        if let Some(uuid) = envelope.uuid() {
            if self.last_uuid.as_deref() != Some(uuid) {
                self.last_uuid = Some(uuid.to_string());
                out.push(UiChunk::MessageMetadata {
                    metadata: RunMetadata::with_sdk_message_uuid(uuid),
                });
            }
        }

        // An absent field keeps the previous scope; only an explicit
        // value (or explicit null) replaces it.
        if let Some(scope) = envelope.parent_scope_update() {
            self.parent_tool_id = scope.map(ToOwned::to_owned);
        }

        match envelope {
            SessionEnvelope::StreamEvent { event, .. } => self.on_stream_event(event, &mut out),
            SessionEnvelope::Assistant { message, .. } => self.on_assistant(message, &mut out),
            SessionEnvelope::User {
                message,
                tool_use_result,
                ..
            } => self.on_user(message, tool_use_result.as_ref(), &mut out),
            SessionEnvelope::System {
                subtype, status, ..
            } => self.on_system(subtype, status.as_deref(), &mut out),
            SessionEnvelope::Result {
                subtype,
                usage,
                total_cost_usd,
                session_id,
                ..
            } => self.on_result(
                subtype.as_deref(),
                usage.as_ref(),
                *total_cost_usd,
                session_id.as_deref(),
                &mut out,
            ),
            SessionEnvelope::Unknown => {}
        }

        out
    }

    fn on_stream_event(&mut self, event: &StreamEvent, out: &mut Vec<UiChunk>) {
        match event {
            StreamEvent::MessageStart => {
                // A new assistant turn on the same instance must not
                // inherit an in-progress thinking buffer.
                self.thinking = None;
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                self.on_block_start(content_block, out);
            }
            StreamEvent::ContentBlockDelta { delta, .. } => self.on_block_delta(delta, out),
            StreamEvent::ContentBlockStop { .. } => {
                if self.thinking.is_some() {
                    self.finish_thinking(out);
                } else if self.open_text_id.is_some() {
                    self.close_text(out);
                } else {
                    self.close_tool(out);
                }
            }
            StreamEvent::MessageDelta | StreamEvent::MessageStop | StreamEvent::Other => {}
        }
    }

    fn on_block_start(&mut self, block: &ContentBlock, out: &mut Vec<UiChunk>) {
        match block {
            ContentBlock::Text { .. } => {
                self.close_tool(out);
                self.open_text(out);
            }
            ContentBlock::ToolUse { id, name, .. } => {
                // Text and tool blocks are mutually exclusive; opening a
                // tool force-closes whichever is still open.
                self.close_text(out);
                self.close_tool(out);
                let composite = self.composite_id(id);
                self.tool_ids.insert(id.clone(), composite.clone());
                out.push(UiChunk::ToolInputStart {
                    tool_call_id: composite.clone(),
                    tool_name: name.clone(),
                });
                self.tool = Some(ToolAccumulator {
                    id: composite,
                    name: name.clone(),
                    input_json: String::new(),
                });
            }
            ContentBlock::Thinking { .. } => {
                let id = self.ephemeral_id("thinking");
                out.push(UiChunk::ToolInputStart {
                    tool_call_id: id.clone(),
                    tool_name: THINKING_TOOL_NAME.to_string(),
                });
                self.thinking = Some(ThinkingAccumulator {
                    id,
                    text: String::new(),
                });
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }

    fn on_block_delta(&mut self, delta: &ContentDelta, out: &mut Vec<UiChunk>) {
        match delta {
            ContentDelta::TextDelta { text } => {
                if self.open_text_id.is_none() {
                    // Missing explicit block start; synthesize one so the
                    // delta still lands in an open block.
                    self.open_text(out);
                }
                let id = self
                    .open_text_id
                    .clone()
                    .unwrap_or_default();
                out.push(UiChunk::TextDelta {
                    id,
                    delta: text.clone(),
                });
            }
            ContentDelta::InputJsonDelta { partial_json } => {
                // Fragments are buffered verbatim; the UI renders partial
                // JSON progressively, so no parsing happens here.
                if let Some(tool) = self.tool.as_mut() {
                    tool.input_json.push_str(partial_json);
                    out.push(UiChunk::ToolInputDelta {
                        tool_call_id: tool.id.clone(),
                        input_text_delta: partial_json.clone(),
                    });
                }
            }
            ContentDelta::ThinkingDelta { thinking } => {
                if let Some(acc) = self.thinking.as_mut() {
                    acc.text.push_str(thinking);
                    out.push(UiChunk::ToolInputDelta {
                        tool_call_id: acc.id.clone(),
                        input_text_delta: thinking.clone(),
                    });
                }
            }
            ContentDelta::SignatureDelta { .. } | ContentDelta::Other => {}
        }
    }

    fn on_assistant(&mut self, message: &AssistantMessage, out: &mut Vec<UiChunk>) {
        for block in &message.content {
            match block {
                ContentBlock::ToolUse { id, name, input } => {
                    let composite = self.composite_id(id);
                    if self.emitted.contains(&composite) || self.emitted.contains(id) {
                        // Already delivered through the streaming path.
                        continue;
                    }
                    self.tool_ids.insert(id.clone(), composite.clone());
                    self.emitted.insert(composite.clone());
                    out.push(UiChunk::ToolInputAvailable {
                        tool_call_id: composite,
                        tool_name: name.clone(),
                        input: input.clone(),
                    });
                }
                ContentBlock::Text { text } => {
                    if self.open_text_id.is_some() {
                        // This content is already arriving incrementally.
                        continue;
                    }
                    let id = self.next_text_id();
                    out.push(UiChunk::TextStart { id: id.clone() });
                    out.push(UiChunk::TextDelta {
                        id: id.clone(),
                        delta: text.clone(),
                    });
                    out.push(UiChunk::TextEnd { id });
                }
                ContentBlock::Thinking { thinking, .. } => {
                    if self.emitted.contains(THINKING_STREAMED) {
                        continue;
                    }
                    self.emitted.insert(THINKING_STREAMED.to_string());
                    let id = self.ephemeral_id("thinking");
                    self.emitted.insert(id.clone());
                    push_thinking_pair(out, id, json!({ "text": thinking }));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
            }
        }
    }

    fn on_user(
        &mut self,
        message: &UserMessage,
        tool_use_result: Option<&Value>,
        out: &mut Vec<UiChunk>,
    ) {
        for block in message.content.blocks() {
            let ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                content,
            } = block
            else {
                continue;
            };

            // A result for a call this instance never saw opened keeps
            // the raw id so the UI still receives it.
            let tool_call_id = self
                .tool_ids
                .get(tool_use_id)
                .cloned()
                .unwrap_or_else(|| tool_use_id.clone());

            if is_error.unwrap_or(false) {
                out.push(UiChunk::ToolOutputError {
                    tool_call_id,
                    error_text: stringify_content(content.as_ref()),
                });
            } else {
                let output = tool_use_result
                    .cloned()
                    .or_else(|| content.clone())
                    .unwrap_or(Value::Null);
                out.push(UiChunk::ToolOutputAvailable {
                    tool_call_id,
                    output,
                });
            }
        }
    }

    fn on_system(&mut self, subtype: &str, status: Option<&str>, out: &mut Vec<UiChunk>) {
        match subtype {
            "status" if status == Some("compacting") => {
                let id = self.ephemeral_id("compact");
                out.push(UiChunk::SystemCompact {
                    tool_call_id: id.clone(),
                    state: CompactState::InputStreaming,
                });
                self.compaction = Some(id);
            }
            "compact_boundary" => {
                // A boundary without an outstanding cycle is dropped.
                if let Some(id) = self.compaction.take() {
                    out.push(UiChunk::SystemCompact {
                        tool_call_id: id,
                        state: CompactState::OutputAvailable,
                    });
                }
            }
            _ => {}
        }
    }

    fn on_result(
        &mut self,
        subtype: Option<&str>,
        usage: Option<&Usage>,
        total_cost_usd: Option<f64>,
        session_id: Option<&str>,
        out: &mut Vec<UiChunk>,
    ) {
        // Safety net against state left dangling at session end or abort.
        self.close_text(out);
        self.close_tool(out);

        let usage = usage.copied().unwrap_or_default();
        let metadata = RunMetadata {
            sdk_message_uuid: None,
            session_id: session_id.map(ToOwned::to_owned),
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
            total_tokens: Some(usage.input_tokens + usage.output_tokens),
            cache_creation_input_tokens: usage.cache_creation_input_tokens,
            cache_read_input_tokens: usage.cache_read_input_tokens,
            total_cost_usd,
            duration_ms: Some(elapsed_ms(self.started_at)),
            result_subtype: Some(subtype.unwrap_or("success").to_string()),
            final_text_id: self.last_text_id.clone(),
        };

        out.push(UiChunk::MessageMetadata {
            metadata: metadata.clone(),
        });
        out.push(UiChunk::FinishStep);
        out.push(UiChunk::Finish { metadata });
    }

    fn open_text(&mut self, out: &mut Vec<UiChunk>) {
        let id = self.next_text_id();
        out.push(UiChunk::TextStart { id: id.clone() });
        self.open_text_id = Some(id);
    }

    fn close_text(&mut self, out: &mut Vec<UiChunk>) {
        if let Some(id) = self.open_text_id.take() {
            out.push(UiChunk::TextEnd { id });
        }
    }

    fn close_tool(&mut self, out: &mut Vec<UiChunk>) {
        if let Some(tool) = self.tool.take() {
            // A replay may have finalized this id while the accumulator
            // was still open; it gets exactly one tool-input-available.
            if self.emitted.insert(tool.id.clone()) {
                out.push(UiChunk::ToolInputAvailable {
                    tool_call_id: tool.id,
                    tool_name: tool.name,
                    input: parse_tool_input(&tool.input_json),
                });
            }
        }
    }

    fn finish_thinking(&mut self, out: &mut Vec<UiChunk>) {
        if let Some(acc) = self.thinking.take() {
            self.emitted.insert(acc.id.clone());
            self.emitted.insert(THINKING_STREAMED.to_string());
            push_thinking_pair(out, acc.id, json!({ "text": acc.text }));
        }
    }

    fn next_text_id(&mut self) -> String {
        self.text_seq += 1;
        let id = format!("text_{}", self.text_seq);
        self.last_text_id = Some(id.clone());
        id
    }

    fn composite_id(&self, original: &str) -> String {
        match &self.parent_tool_id {
            Some(parent) => format!("{parent}:{original}"),
            None => original.to_string(),
        }
    }

    // The counter keeps ids unique even within one millisecond.
    fn ephemeral_id(&mut self, prefix: &str) -> String {
        self.ephemeral_seq += 1;
        format!("{prefix}_{}_{}", current_epoch_ms(), self.ephemeral_seq)
    }
}

/// Runs a whole envelope sequence through a fresh transducer.
#[must_use]
pub fn transduce<'a, I>(envelopes: I) -> Vec<UiChunk>
where
    I: IntoIterator<Item = &'a SessionEnvelope>,
{
    let mut transducer = Transducer::new();
    envelopes
        .into_iter()
        .flat_map(|envelope| transducer.handle_envelope(envelope))
        .collect()
}

fn push_thinking_pair(out: &mut Vec<UiChunk>, id: String, input: Value) {
    out.push(UiChunk::ToolInputAvailable {
        tool_call_id: id.clone(),
        tool_name: THINKING_TOOL_NAME.to_string(),
        input,
    });
    out.push(UiChunk::ToolOutputAvailable {
        tool_call_id: id,
        output: json!({ "completed": true }),
    });
}

// Empty or truncated accumulations degrade to an empty object instead of
// propagating a parse failure past the component boundary.
fn parse_tool_input(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({}))
}

fn stringify_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn current_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
