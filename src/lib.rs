//! Session-event transducer for conversational coding agents.
//!
//! An agent run produces a heterogeneous envelope stream: token-level
//! deltas, complete replayed messages, tool results, status notices, and
//! a terminal summary. The [`Transducer`] consumes that stream one
//! envelope at a time and emits a single ordered sequence of UI chunks,
//! reconciling the overlapping delta/replay channels without duplicating
//! content and keeping block open/close lifecycles strict.
//!
//! Wire shapes for the input side live in the `agent_stream` crate; this
//! crate owns the output vocabulary and the reconciliation state machine.

pub mod chunk;
pub mod transducer;

pub use chunk::{CompactState, RunMetadata, UiChunk};
pub use transducer::{transduce, Transducer, THINKING_TOOL_NAME};
