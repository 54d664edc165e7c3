//! Incremental SSE frame parser.
//!
//! Feeds on raw byte chunks as they arrive off the wire (chunks may split
//! lines, even UTF-8 sequences) and yields complete frames at every blank
//! line.  Comment lines and fields other than `event:`/`data:` (`id:`,
//! `retry:`, ...) are ignored, as the wire contract requires.

use evento_protocol::{Poke, POKE_EVENT};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Decode this frame as a poke, if that is what it is.
    pub fn poke(&self) -> Option<Poke> {
        if self.event.as_deref() != Some(POKE_EVENT) {
            return None;
        }
        serde_json::from_str(&self.data).ok()
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    residual: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        SseParser::default()
    }

    /// Consume a chunk and return every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.residual.extend_from_slice(chunk);
        let mut frames = Vec::new();

        // Process complete lines only; a trailing partial line stays
        // buffered for the next chunk.
        while let Some(newline) = self.residual.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.residual.drain(..=newline).collect();
            let mut line = &line[..line.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if let Some(frame) = self.take_line(&String::from_utf8_lossy(line)) {
                frames.push(frame);
            }
        }
        frames
    }

    fn take_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Blank line: dispatch if anything accumulated.
            let event = self.event.take();
            let data = std::mem::take(&mut self.data);
            if data.is_empty() {
                return None;
            }
            return Some(SseFrame {
                event,
                data: data.join("\n"),
            });
        }
        if line.starts_with(':') {
            // Comment (keepalive); ignored.
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            // id, retry, anything future: ignored.
            _ => {}
        }
        None
    }
}
