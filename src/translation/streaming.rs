// Stream Translator (C2), spec §4.2: a stateful state machine converting
// a stream of Gemini chunks into Anthropic SSE events with correct block
// lifecycle. One instance is created per streaming request and dropped at
// response end or client disconnect.

use crate::error::Result;
use crate::models::anthropic::Usage as AnthropicUsage;
use crate::models::gemini::{GeminiStreamChunk, Part as GeminiPart};
use crate::models::streaming::{
    ContentBlockStart, Delta, DeltaUsage, ErrorData, MessageDeltaData, MessageStart, StreamEvent,
};
use crate::utils::ids::{new_thinking_signature, new_tool_id};

#[derive(Debug, PartialEq, Clone, Copy)]
enum ActiveBlock {
    None,
    Text,
    Thinking,
}

pub struct StreamTranslator {
    message_id: String,
    model: String,
    input_tokens: u32,
    output_tokens: u32,
    block_index: i32,
    active_block: ActiveBlock,
    started: bool,
    has_function_call: bool,
}

impl StreamTranslator {
    pub fn new(message_id: String, model: String) -> Self {
        Self {
            message_id,
            model,
            input_tokens: 0,
            output_tokens: 0,
            block_index: 0,
            active_block: ActiveBlock::None,
            started: false,
            has_function_call: false,
        }
    }

    /// `process_chunk(chunk) → [SSEFrame]` (spec §4.2).
    pub fn process_chunk(&mut self, chunk: GeminiStreamChunk) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        if let Some(error) = chunk.error {
            events.push(StreamEvent::Error {
                error: ErrorData { error_type: "api_error".to_string(), message: error.to_string() },
            });
            return Ok(events);
        }

        if let Some(usage) = &chunk.usage_metadata {
            if let Some(input) = usage.prompt_token_count {
                self.input_tokens = input;
            }
            if let Some(output) = usage.candidates_token_count {
                self.output_tokens = output;
            }
        }

        self.emit_prelude(&mut events);

        for candidate in chunk.candidates.into_iter().flatten() {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for part in parts {
                self.process_part(part, &mut events);
            }

            if candidate.finish_reason.is_some() {
                self.close_active_block(&mut events);

                let stop_reason = if self.has_function_call { "tool_use" } else { "end_turn" };
                events.push(StreamEvent::MessageDelta {
                    delta: MessageDeltaData { stop_reason: Some(stop_reason.to_string()), stop_sequence: None },
                    usage: DeltaUsage { output_tokens: self.output_tokens },
                });
                events.push(StreamEvent::MessageStop);
                crate::metrics::record_tokens(&self.model, self.input_tokens, self.output_tokens);
            }
        }

        Ok(events)
    }

    fn emit_prelude(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }
        events.push(StreamEvent::MessageStart {
            message: MessageStart {
                id: self.message_id.clone(),
                message_type: "message".to_string(),
                role: "assistant".to_string(),
                content: vec![],
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: AnthropicUsage { input_tokens: self.input_tokens, output_tokens: 0 },
            },
        });
        events.push(StreamEvent::Ping);
        self.started = true;
    }

    fn process_part(&mut self, part: GeminiPart, events: &mut Vec<StreamEvent>) {
        match part {
            GeminiPart::FunctionCall { function_call, .. } => {
                self.close_active_block(events);

                let tool_id = new_tool_id();
                events.push(StreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ContentBlockStart::ToolUse { id: tool_id, name: function_call.name },
                });

                let partial_json = serde_json::to_string(&function_call.args).unwrap_or_else(|_| "{}".to_string());
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.block_index,
                    delta: Delta::InputJsonDelta { partial_json },
                });
                events.push(StreamEvent::ContentBlockStop { index: self.block_index });

                self.block_index += 1;
                self.active_block = ActiveBlock::None;
                self.has_function_call = true;
            }

            GeminiPart::Text { text, thought: Some(true), .. } if !text.is_empty() => {
                self.ensure_block_open(ActiveBlock::Thinking, events);
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.block_index,
                    delta: Delta::ThinkingDelta { thinking: text },
                });
            }

            GeminiPart::Text { text, .. } if !text.is_empty() => {
                self.ensure_block_open(ActiveBlock::Text, events);
                events.push(StreamEvent::ContentBlockDelta { index: self.block_index, delta: Delta::TextDelta { text } });
            }

            // Empty text parts, function responses, and inline data are not
            // streamed incrementally (spec §4.2 edge cases).
            _ => {}
        }
    }

    fn ensure_block_open(&mut self, wanted: ActiveBlock, events: &mut Vec<StreamEvent>) {
        if self.active_block == wanted {
            return;
        }
        if self.active_block != ActiveBlock::None {
            self.close_active_block(events);
        }
        let content_block = match wanted {
            ActiveBlock::Text => ContentBlockStart::Text { text: String::new() },
            ActiveBlock::Thinking => ContentBlockStart::Thinking,
            ActiveBlock::None => return,
        };
        events.push(StreamEvent::ContentBlockStart { index: self.block_index, content_block });
        self.active_block = wanted;
    }

    fn close_active_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.active_block == ActiveBlock::None {
            return;
        }
        if self.active_block == ActiveBlock::Thinking {
            events.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: Delta::SignatureDelta { signature: new_thinking_signature() },
            });
        }
        events.push(StreamEvent::ContentBlockStop { index: self.block_index });
        self.block_index += 1;
        self.active_block = ActiveBlock::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gemini::{Content, FunctionCall, StreamCandidate, UsageMetadata};

    fn chunk_with_text(text: &str) -> GeminiStreamChunk {
        GeminiStreamChunk {
            candidates: Some(vec![StreamCandidate {
                content: Some(Content { role: "model".to_string(), parts: vec![GeminiPart::text(text)] }),
                finish_reason: None,
                index: Some(0),
            }]),
            usage_metadata: None,
            error: None,
        }
    }

    #[test]
    fn first_chunk_emits_prelude_then_text_delta() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "claude-haiku-4-5-20251001".to_string());
        let events = t.process_chunk(chunk_with_text("Hello")).unwrap();
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], StreamEvent::Ping));
        assert!(matches!(events[2], StreamEvent::ContentBlockStart { index: 0, .. }));
        match &events[3] {
            StreamEvent::ContentBlockDelta { index: 0, delta: Delta::TextDelta { text } } => assert_eq!(text, "Hello"),
            _ => panic!("expected text delta"),
        }
    }

    #[test]
    fn second_chunk_only_emits_delta_at_same_index() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "m".to_string());
        t.process_chunk(chunk_with_text("Hello")).unwrap();
        let events = t.process_chunk(chunk_with_text(" world")).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ContentBlockDelta { index: 0, delta: Delta::TextDelta { text } } => assert_eq!(text, " world"),
            _ => panic!("expected text delta"),
        }
    }

    #[test]
    fn tool_call_produces_atomic_block_with_cmm_id() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "m".to_string());
        let chunk = GeminiStreamChunk {
            candidates: Some(vec![StreamCandidate {
                content: Some(Content {
                    role: "model".to_string(),
                    parts: vec![GeminiPart::FunctionCall {
                        function_call: FunctionCall {
                            name: "get_weather".to_string(),
                            args: serde_json::json!({"location": "NYC"}),
                        },
                        thought_signature: None,
                    }],
                }),
                finish_reason: Some("STOP".to_string()),
                index: Some(0),
            }]),
            usage_metadata: Some(UsageMetadata { prompt_token_count: Some(10), candidates_token_count: Some(5) }),
            error: None,
        };
        let events = t.process_chunk(chunk).unwrap();
        // message_start, ping, content_block_start, delta, stop, message_delta, message_stop
        assert_eq!(events.len(), 7);
        match &events[2] {
            StreamEvent::ContentBlockStart { content_block: ContentBlockStart::ToolUse { id, name }, .. } => {
                assert!(id.starts_with("toolu_cmm_"));
                assert_eq!(name, "get_weather");
            }
            _ => panic!("expected tool_use block start"),
        }
        match &events[5] {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
                assert_eq!(usage.output_tokens, 5);
            }
            _ => panic!("expected message_delta"),
        }
        assert!(matches!(events[6], StreamEvent::MessageStop));
    }

    #[test]
    fn thinking_block_closes_with_signature_before_text() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "m".to_string());
        let chunk = GeminiStreamChunk {
            candidates: Some(vec![StreamCandidate {
                content: Some(Content {
                    role: "model".to_string(),
                    parts: vec![GeminiPart::thought("reasoning"), GeminiPart::text("answer")],
                }),
                finish_reason: None,
                index: Some(0),
            }]),
            usage_metadata: None,
            error: None,
        };
        let events = t.process_chunk(chunk).unwrap();
        let has_signature_delta =
            events.iter().any(|e| matches!(e, StreamEvent::ContentBlockDelta { delta: Delta::SignatureDelta { .. }, .. }));
        assert!(has_signature_delta);
    }

    #[test]
    fn empty_candidates_emits_only_prelude() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "m".to_string());
        let chunk = GeminiStreamChunk { candidates: Some(vec![]), usage_metadata: None, error: None };
        let events = t.process_chunk(chunk).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn error_chunk_short_circuits() {
        let mut t = StreamTranslator::new("msg_cmm_x".to_string(), "m".to_string());
        let chunk = GeminiStreamChunk { candidates: None, usage_metadata: None, error: Some(serde_json::json!({"message": "boom"})) };
        let events = t.process_chunk(chunk).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }
}
