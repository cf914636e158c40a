//! Data model for the agent CLI's newline-delimited JSON session stream.
//!
//! This crate defines only the wire shapes of session envelopes and an
//! incremental line parser. It excludes process supervision, transport,
//! and any interpretation of envelope ordering; consumers decide what
//! each envelope means for them.

mod envelope;
mod parser;

pub use envelope::{
    AssistantMessage, ContentBlock, ContentDelta, SessionEnvelope, StreamEvent, Usage,
    UserContent, UserMessage,
};
pub use parser::{parse_transcript_strict, StreamJsonParser, StreamParseError};
