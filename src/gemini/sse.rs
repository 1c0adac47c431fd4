// SSE Framer (C3), spec §4.3: an incremental parser over UTF-8 text that
// recovers discrete JSON events from a byte stream of `data: …\n\n`
// blocks. It is deliberately format-agnostic (returns `serde_json::Value`,
// not a typed `GeminiStreamChunk`) — the optional `{response: …}`
// compatibility-proxy envelope (spec §4.4 step 6) is unwrapped by the
// caller before the value is deserialized into a typed chunk.

use crate::error::{ProxyError, Result};
use tracing::warn;

/// Buffer is bounded at 5 MiB; exceeding it is a hard error that
/// terminates the connection (spec §4.3).
const MAX_SSE_BUFFER: usize = 5 * 1024 * 1024;

const DATA_PREFIX: &str = "data: ";

pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self { buffer: String::new() }
    }

    /// `feed(chunk) → [event]`: append `chunk`, split on `"\n\n"`, return
    /// parsed events from every complete block, retain the trailing
    /// incomplete block.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<serde_json::Value>> {
        self.buffer.push_str(chunk);
        if self.buffer.len() > MAX_SSE_BUFFER {
            return Err(ProxyError::StreamOverflow);
        }

        let mut events = Vec::new();
        loop {
            match self.buffer.find("\n\n") {
                Some(idx) => {
                    let block = self.buffer[..idx].to_string();
                    self.buffer.drain(..idx + 2);
                    if let Some(event) = parse_block(&block) {
                        events.push(event);
                    }
                }
                None => break,
            }
        }
        Ok(events)
    }

    /// `flush() → [event]`: parse whatever remains in the buffer as a
    /// final block and clear it.
    pub fn flush(&mut self) -> Vec<serde_json::Value> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block).into_iter().collect()
    }
}

impl Default for SseFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every `"data: "` line in the block, concatenate suffixes with
/// `"\n"`, and attempt a JSON parse. Malformed JSON yields no event.
fn parse_block(block: &str) -> Option<serde_json::Value> {
    let data: String = block
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "malformed SSE data block, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_parses_complete_block() {
        let mut framer = SseFramer::new();
        let chunk = "event: message\ndata: {\"candidates\":[]}\n\n";
        let events = framer.feed(chunk).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn feed_retains_incomplete_trailing_block() {
        let mut framer = SseFramer::new();
        let events = framer.feed("data: {\"candidates\":[]}").unwrap();
        assert!(events.is_empty());
        let events = framer.feed("\n\n").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn flush_parses_trailing_block_without_blank_line() {
        let mut framer = SseFramer::new();
        framer.feed("data: {\"candidates\":[]}").unwrap();
        let events = framer.flush();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn malformed_json_yields_no_event() {
        let mut framer = SseFramer::new();
        let events = framer.feed("data: not json\n\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn multi_line_data_is_joined_with_newline() {
        let mut framer = SseFramer::new();
        let chunk = "data: {\"candidates\":\ndata: []}\n\n";
        let events = framer.feed(chunk).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut framer = SseFramer::new();
        let chunk = "event: ping\nid: 1\ndata: {\"candidates\":[]}\n\n";
        let events = framer.feed(chunk).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn oversized_buffer_is_a_hard_error() {
        let mut framer = SseFramer::new();
        let huge = "a".repeat(MAX_SSE_BUFFER + 1);
        assert!(framer.feed(&huge).is_err());
    }
}
