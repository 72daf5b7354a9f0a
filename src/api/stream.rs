//! Newline-delimited reply stream protocol.
//!
//! The `/chat/stream` endpoint delivers the assistant reply as a sequence
//! of records, one per line:
//!
//! ```text
//! data: first fragment
//! data: second fragment
//! data: [DONE]
//! ```
//!
//! Only `data:`-prefixed lines are significant; `[DONE]` is the terminal
//! sentinel; anything else (unknown prefixes, truncated lines) is silently
//! discarded. Bytes are buffered until a full line is available so a
//! multi-byte UTF-8 sequence split across transport chunks never corrupts
//! a payload.

/// Events emitted while a streamed reply is consumed.
///
/// `Snapshot` carries the **full accumulated text**, not a delta: the
/// accumulator is the unit of truth, and replacing the in-flight message
/// wholesale keeps it correct regardless of how the transport chunked the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// The accumulator grew; contains the entire reply text so far.
    Snapshot(String),
    /// Normal completion (sentinel or clean transport close). An empty
    /// `text` is a valid empty reply, not an error.
    Done { text: String },
    /// Transport failed mid-reply.
    Failed(String),
}

/// One significant record parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyRecord {
    /// A payload fragment to append verbatim to the accumulator.
    Payload(String),
    /// The terminal sentinel.
    Done,
}

/// Record prefix for payload-carrying lines.
const DATA_PREFIX: &str = "data:";

/// Terminal sentinel payload.
const SENTINEL: &str = "[DONE]";

/// Incremental line parser over the reply byte stream.
///
/// Feed transport chunks via [`ReplyLineParser::push`]; complete records
/// are returned as they become available. A trailing partial line at
/// stream end is a truncated record and is discarded.
#[derive(Debug, Default)]
pub struct ReplyLineParser {
    buf: Vec<u8>,
}

impl ReplyLineParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning any records completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReplyRecord> {
        self.buf.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(record) = parse_line(line) {
                records.push(record);
            }
        }
        records
    }
}

/// Parse one complete line into a record, or `None` for insignificant lines.
fn parse_line(line: &str) -> Option<ReplyRecord> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    // Strip a single leading space after the prefix.
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == SENTINEL {
        return Some(ReplyRecord::Done);
    }
    if payload.is_empty() {
        return None;
    }
    Some(ReplyRecord::Payload(payload.to_owned()))
}
