//! Incremental decoder for OpenAI-style `data:` event lines
//!
//! Bytes are buffered until a full line is available, so a network chunk that
//! ends mid-line (or mid UTF-8 sequence) is held back and completed by the next
//! push. Each complete `data:` line becomes one frame.

use tracing::debug;

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line, prefix removed
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        debug!(len = bytes.len(), buffered = self.buffer.len(), "SseDecoder::push: called");
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Option<SseFrame> {
        debug!(buffered = self.buffer.len(), "SseDecoder::finish: called");
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseFrame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();

    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let Some(data) = line.strip_prefix("data:") else {
        debug!(%line, "decode_line: ignoring non-data field");
        return None;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == DONE_SENTINEL {
        debug!("decode_line: done sentinel");
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(data.to_string()))
    }
}
