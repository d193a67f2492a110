//! Newline-delimited JSON framing for [`TransportMessage`]s.
//!
//! One message per line. Lines that fail to parse are dropped and counted
//! rather than surfaced as errors, so a single corrupt frame never tears
//! down a channel.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::TransportMessage;

/// Upper bound on a single unterminated line before it is discarded
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

const INITIAL_BUF_CAPACITY: usize = 8 * 1024;

/// Serialize a message as exactly one `\n`-terminated JSON line
pub fn encode(message: &TransportMessage) -> Result<String, TransportError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Decode every complete line of `buffer`, dropping blank and malformed lines
pub fn decode(buffer: &str) -> Vec<TransportMessage> {
    buffer.split('\n').filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<TransportMessage> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Dropping unparsable frame: {}", e);
            None
        }
    }
}

/// Incremental decoder for a byte stream that may split lines across reads
#[derive(Debug)]
pub struct LineDecoder {
    buf: BytesMut,
    dropped: u64,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUF_CAPACITY),
            dropped: 0,
        }
    }

    /// Append a chunk and return every message completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TransportMessage> {
        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            self.push_line(&line, &mut messages);
        }

        if self.buf.len() > MAX_LINE_LENGTH {
            warn!(
                "Discarding {} buffered bytes without a line terminator",
                self.buf.len()
            );
            self.buf.clear();
            self.dropped += 1;
        }

        messages
    }

    /// Flush an unterminated trailing line at end of stream
    pub fn finish(&mut self) -> Vec<TransportMessage> {
        let rest = self.buf.split();
        let mut messages = Vec::new();
        self.push_line(&rest, &mut messages);
        messages
    }

    /// Number of non-blank lines discarded so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn push_line(&mut self, line: &[u8], out: &mut Vec<TransportMessage>) {
        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            return;
        }
        match parse_line(&text) {
            Some(message) => out.push(message),
            None => self.dropped += 1,
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
