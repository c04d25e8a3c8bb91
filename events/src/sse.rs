//! Incremental server-sent-events framing.
//!
//! Bytes arrive in arbitrary chunks, so a line (or a multi-byte character) may
//! be split across pushes. The decoder buffers until it sees `\n`, handles one
//! line at a time, and emits a payload when a blank line ends the event.
//!
//! Only `data` fields matter here. Comment lines (`: heartbeat`) and other
//! fields (`event:`, `id:`, `retry:`) are dropped. A `data:` value that itself
//! starts with `data:` (inner space optional) has exactly one extra layer removed.

#[cfg(test)]
#[path = "sse_test.rs"]
mod sse_test;

use crate::CodecError;

const DATA_FIELD: &str = "data:";

/// Streaming SSE decoder that yields raw JSON payload strings.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    poisoned: Option<std::str::Utf8Error>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes.
    ///
    /// Each item is either a payload or the error that spoiled that event.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, CodecError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + pos;
            let mut line = &self.buffer[consumed..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            match std::str::from_utf8(line) {
                Ok(text) => {
                    let text = text.to_owned();
                    if let Some(item) = self.handle_line(&text) {
                        out.push(item);
                    }
                }
                Err(e) => self.poisoned = Some(e),
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);
        out
    }

    /// Flush an event left open when the stream ended without a blank line.
    pub fn finish(&mut self) -> Option<Result<String, CodecError>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let trimmed = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
            match std::str::from_utf8(trimmed) {
                Ok(text) => {
                    if let Some(item) = self.handle_line(text) {
                        return Some(item);
                    }
                }
                Err(e) => self.poisoned = Some(e),
            }
        }
        self.dispatch()
    }

    fn handle_line(&mut self, line: &str) -> Option<Result<String, CodecError>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix(DATA_FIELD) {
            let value = strip_field_value(value);
            let value = value.strip_prefix(DATA_FIELD).map_or(value, strip_field_value);
            self.data.push(value.to_owned());
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<String, CodecError>> {
        if let Some(e) = self.poisoned.take() {
            self.data.clear();
            return Some(Err(CodecError::Utf8(e)));
        }
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(Ok(payload))
    }
}

/// Drop the single optional space after a field name.
fn strip_field_value(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
