// Response translation (Gemini → Anthropic, unary path), spec §4.1.
//
// The streaming path has its own state machine in `streaming.rs`; this
// module only handles the non-streaming `generateContent` response, which
// reuses the same `GeminiStreamChunk` shape as a single SSE chunk would.

use crate::error::{ProxyError, Result};
use crate::models::anthropic::{ContentBlock, MessagesResponse, Usage};
use crate::models::gemini::{GeminiStreamChunk, Part as GeminiPart};
use crate::utils::ids::{new_message_id, new_thinking_signature, new_tool_id};
use tracing::{debug, warn};

/// Translate a unary Gemini response into an Anthropic `MessagesResponse`.
pub fn translate_response(chunk: GeminiStreamChunk, model: &str) -> Result<MessagesResponse> {
    if let Some(err) = chunk.error {
        return Err(ProxyError::GeminiApi(err.to_string()));
    }

    let candidate = chunk
        .candidates
        .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
        .ok_or_else(|| ProxyError::Translation("no candidates in Gemini response".to_string()))?;

    debug!(finish_reason = ?candidate.finish_reason, "translating unary response");

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let content = translate_parts(parts)?;
    let stop_reason = map_stop_reason(candidate.finish_reason.as_deref(), &content);

    let usage = chunk
        .usage_metadata
        .map(|u| Usage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
        })
        .unwrap_or_default();

    crate::metrics::record_tokens(model, usage.input_tokens, usage.output_tokens);

    let mut response = MessagesResponse::new(new_message_id(), model.to_string(), content, usage);
    response.stop_reason = stop_reason;
    Ok(response)
}

/// Translate Gemini parts to Anthropic content blocks (spec §4.1).
pub fn translate_parts(parts: Vec<GeminiPart>) -> Result<Vec<ContentBlock>> {
    parts.into_iter().map(translate_part).collect()
}

fn translate_part(part: GeminiPart) -> Result<ContentBlock> {
    match part {
        GeminiPart::Text { text, thought: Some(true), thought_signature } => Ok(ContentBlock::Thinking {
            thinking: text,
            signature: Some(thought_signature.unwrap_or_else(new_thinking_signature)),
        }),

        GeminiPart::Text { text, .. } => Ok(ContentBlock::Text { text }),

        GeminiPart::FunctionCall { function_call, .. } => Ok(ContentBlock::ToolUse {
            id: new_tool_id(),
            name: function_call.name,
            input: function_call.args,
        }),

        GeminiPart::FunctionResponse { function_response } => {
            warn!(name = %function_response.name, "unexpected functionResponse in model output");
            crate::metrics::record_translation_error("response", "unexpected_function_response");
            Err(ProxyError::Translation(
                "function response should not appear in assistant messages".to_string(),
            ))
        }

        GeminiPart::InlineData { .. } => {
            crate::metrics::record_translation_error("response", "unsupported_inline_data");
            Err(ProxyError::Translation("inline data in model output is not supported".to_string()))
        }
    }
}

/// `finishReason → stop_reason` (spec §4.1): any assistant turn that
/// produced a tool_use block always reports `tool_use`, regardless of
/// Gemini's own finish reason.
fn map_stop_reason(finish_reason: Option<&str>, content: &[ContentBlock]) -> Option<String> {
    if content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })) {
        return Some("tool_use".to_string());
    }
    match finish_reason {
        Some("STOP") => Some("end_turn".to_string()),
        Some("MAX_TOKENS") => Some("max_tokens".to_string()),
        Some("SAFETY") | Some("RECITATION") => Some("stop_sequence".to_string()),
        Some("OTHER") | None => None,
        Some(other) => {
            warn!(finish_reason = other, "unknown finish reason");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gemini::{Content, FunctionCall, StreamCandidate, UsageMetadata};

    fn chunk(parts: Vec<GeminiPart>, finish_reason: Option<&str>) -> GeminiStreamChunk {
        GeminiStreamChunk {
            candidates: Some(vec![StreamCandidate {
                content: Some(Content { role: "model".to_string(), parts }),
                finish_reason: finish_reason.map(str::to_string),
                index: Some(0),
            }]),
            usage_metadata: Some(UsageMetadata { prompt_token_count: Some(10), candidates_token_count: Some(5) }),
            error: None,
        }
    }

    #[test]
    fn translates_plain_text_response() {
        let res = translate_response(chunk(vec![GeminiPart::text("hi")], Some("STOP")), "claude-sonnet-4-5").unwrap();
        assert_eq!(res.content.len(), 1);
        assert_eq!(res.stop_reason.as_deref(), Some("end_turn"));
        assert!(res.id.starts_with("msg_cmm_"));
        assert_eq!(res.usage.input_tokens, 10);
    }

    #[test]
    fn thinking_part_gets_minted_signature_when_absent() {
        let res = translate_response(chunk(vec![GeminiPart::thought("reasoning...")], Some("STOP")), "m").unwrap();
        match &res.content[0] {
            ContentBlock::Thinking { signature, .. } => assert!(signature.is_some()),
            _ => panic!("expected Thinking block"),
        }
    }

    #[test]
    fn tool_use_forces_tool_use_stop_reason() {
        let part = GeminiPart::FunctionCall {
            function_call: FunctionCall { name: "get_weather".to_string(), args: serde_json::json!({}) },
            thought_signature: None,
        };
        let res = translate_response(chunk(vec![part], Some("STOP")), "m").unwrap();
        assert_eq!(res.stop_reason.as_deref(), Some("tool_use"));
        match &res.content[0] {
            ContentBlock::ToolUse { id, .. } => assert!(id.starts_with("toolu_cmm_")),
            _ => panic!("expected ToolUse block"),
        }
    }

    #[test]
    fn missing_candidates_errors() {
        let chunk = GeminiStreamChunk { candidates: None, usage_metadata: None, error: None };
        assert!(translate_response(chunk, "m").is_err());
    }

    #[test]
    fn upstream_error_field_propagates() {
        let chunk = GeminiStreamChunk {
            candidates: None,
            usage_metadata: None,
            error: Some(serde_json::json!({"message": "quota exceeded"})),
        };
        assert!(translate_response(chunk, "m").is_err());
    }
}
