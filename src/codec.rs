//! Newline-delimited JSON framing for turn streams
//!
//! Every record is one JSON object followed by `\n`. A turn stream is zero or
//! more `chunk` records followed by exactly one `end` or `error` record.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// MIME type of an encoded turn stream
pub const CONTENT_TYPE: &str = "application/x-ndjson";

/// One record of a turn stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk { content: String },
    End,
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End | StreamEvent::Error { .. })
    }
}

/// Encode a record as a single line
pub fn encode(event: &StreamEvent) -> Bytes {
    let mut line = serde_json::to_vec(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode stream record");
        br#"{"type":"error","message":"failed to encode stream record"}"#.to_vec()
    });
    line.push(b'\n');
    Bytes::from(line)
}

/// Incremental decoder that tolerates records split across reads.
///
/// Bytes after the last newline are held until the next `feed`. Lines that
/// are blank or fail to parse are skipped and counted.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    pending: Vec<u8>,
    skipped: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next read; returns every record it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Flush a final record that arrived without a trailing newline
    pub fn finish(mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.pending);
        self.parse_line(&rest).into_iter().collect()
    }

    /// Number of malformed lines dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice(line) {
            Ok(event) => Some(event),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, len = line.len(), "Skipping malformed stream record");
                None
            }
        }
    }
}

/// Client-side view of one assistant reply as records arrive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    content: String,
    streaming: bool,
    error: Option<String>,
}

impl Default for TurnView {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnView {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            streaming: true,
            error: None,
        }
    }

    /// Apply a record. Returns true once a terminal record has been seen;
    /// records after that are ignored.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        if !self.streaming {
            return true;
        }
        match event {
            StreamEvent::Chunk { content } => {
                self.content.push_str(content);
                false
            }
            StreamEvent::End => {
                self.streaming = false;
                true
            }
            StreamEvent::Error { message } => {
                self.streaming = false;
                self.error = Some(message.clone());
                true
            }
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
