use thiserror::Error;

use crate::envelope::SessionEnvelope;

/// Incremental parser for newline-delimited JSON session streams.
///
/// The live path is tolerant: blank lines and lines that fail to decode
/// are skipped so one garbled record cannot stall the run.
#[derive(Debug, Default)]
pub struct StreamJsonParser {
    buffer: String,
}

impl StreamJsonParser {
    /// Feed arbitrary bytes into the parser and drain complete lines.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SessionEnvelope> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut envelopes = Vec::new();

        while let Some(split) = self.buffer.find('\n') {
            let line = self.buffer[..split].trim().to_string();
            self.buffer.drain(0..=split);

            if line.is_empty() {
                continue;
            }

            if let Ok(envelope) = serde_json::from_str::<SessionEnvelope>(&line) {
                envelopes.push(envelope);
            }
        }

        envelopes
    }

    /// Drains a trailing record that arrived without a final newline.
    pub fn flush(&mut self) -> Option<SessionEnvelope> {
        let line = self.buffer.trim().to_string();
        self.buffer.clear();

        if line.is_empty() {
            return None;
        }

        serde_json::from_str(&line).ok()
    }

    /// Parse a complete transcript string in one shot.
    #[must_use]
    pub fn parse_transcript(input: &str) -> Vec<SessionEnvelope> {
        let mut parser = Self::default();
        let mut envelopes = parser.feed(input.as_bytes());
        envelopes.extend(parser.flush());
        envelopes
    }

    #[must_use]
    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

/// Error produced by the strict transcript parse path.
#[derive(Debug, Error)]
pub enum StreamParseError {
    #[error("failed to parse session envelope at line {line}: {source}")]
    JsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Strict variant of [`StreamJsonParser::parse_transcript`] for stored
/// transcripts, where a bad line indicates corruption rather than a
/// transient stream glitch.
pub fn parse_transcript_strict(input: &str) -> Result<Vec<SessionEnvelope>, StreamParseError> {
    let mut envelopes = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope = serde_json::from_str(line).map_err(|source| {
            StreamParseError::JsonLine {
                line: index + 1,
                source,
            }
        })?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}
