// Request translation (C1, Anthropic → Gemini), spec §4.1.
//
// `anthropic_to_gemini` is a pure function: given an `AnthropicRequest` it
// returns the equivalent `GeminiRequest`, with no network or cache access.

use crate::error::{ProxyError, Result};
use crate::models::anthropic::{ContentBlock, Message, MessageContent, MessagesRequest, ToolChoice};
use crate::models::gemini::{
    Content, FunctionCallingConfig, GenerateContentRequest, GenerationConfig, Part as GeminiPart,
    SystemInstruction, ThinkingConfig as GeminiThinkingConfig, ToolConfig,
};
use crate::translation::tools::{translate_tool_result, translate_tool_use, translate_tools};
use std::collections::HashMap;

/// Sentinel substituted for an unresolved `tool_result.tool_use_id`
/// (spec invariant 2: never fail the request).
const UNKNOWN_TOOL: &str = "unknown_tool";

/// `anthropic_to_gemini(req) → gemini_req` (spec §4.1).
pub fn anthropic_to_gemini(req: &MessagesRequest) -> Result<GenerateContentRequest> {
    let contents = translate_messages(&req.messages)?;

    let system_instruction = req.system.as_ref().and_then(|sys| {
        if sys.is_empty() {
            None
        } else {
            Some(SystemInstruction { parts: vec![GeminiPart::text(sys.to_text())] })
        }
    });

    let tools = req.tools.as_ref().map(|t| translate_tools(t.clone()));

    let tool_config = req.tool_choice.as_ref().map(translate_tool_choice);

    let thinking_config = req.thinking.as_ref().and_then(|thinking| {
        if !thinking.is_enabled() {
            return None;
        }
        thinking.budget_tokens.map(|budget| GeminiThinkingConfig { thinking_budget: Some(budget) })
    });

    let generation_config = Some(GenerationConfig {
        max_output_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        stop_sequences: req.stop_sequences.clone(),
        thinking_config,
    });

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        generation_config,
        tools,
        tool_config,
    })
}

/// Backwards-compatible name used elsewhere in the pipeline.
pub fn translate_request(req: &MessagesRequest) -> Result<GenerateContentRequest> {
    anthropic_to_gemini(req)
}

/// `tool_choice`: `none → NONE`; `any → ANY`; `tool{name} → ANY` with
/// `allowedFunctionNames:[name]`; anything else → `AUTO`.
fn translate_tool_choice(choice: &ToolChoice) -> ToolConfig {
    let config = match choice {
        ToolChoice::None => FunctionCallingConfig { mode: "NONE".to_string(), allowed_function_names: None },
        ToolChoice::Any => FunctionCallingConfig { mode: "ANY".to_string(), allowed_function_names: None },
        ToolChoice::Tool { name } => FunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![name.clone()]),
        },
        ToolChoice::Auto => FunctionCallingConfig { mode: "AUTO".to_string(), allowed_function_names: None },
    };
    ToolConfig { function_calling_config: config }
}

/// `lookupToolName`: a prior pass over the message list collecting every
/// assistant `tool_use.id → name` (spec §4.1).
fn build_tool_name_map(messages: &[Message]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for msg in messages {
        for block in msg.content.as_blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                map.insert(id, name);
            }
        }
    }
    map
}

/// Translate the message list, merging adjacent same-Gemini-role contents
/// (spec invariant 1 / §8 property 2: role merging).
fn translate_messages(messages: &[Message]) -> Result<Vec<Content>> {
    let tool_names = build_tool_name_map(messages);
    let mut contents: Vec<Content> = Vec::new();

    for msg in messages {
        let role = match msg.role.as_str() {
            "user" => "user",
            "assistant" => "model",
            other => {
                return Err(ProxyError::InvalidRequest(format!(
                    "invalid role '{other}': must be 'user' or 'assistant'"
                )))
            }
        };

        let parts = translate_message_content(&msg.content, &tool_names)?;
        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role == role => last.parts.extend(parts),
            _ => contents.push(Content { role: role.to_string(), parts }),
        }
    }

    Ok(contents)
}

fn translate_message_content(
    content: &MessageContent,
    tool_names: &HashMap<String, String>,
) -> Result<Vec<GeminiPart>> {
    // `pendingThoughtSignature`: per-message local state (spec invariant 3)
    // carrying a `thinking` block's signature forward to the next
    // functionCall part in the same message.
    let mut pending_thought_signature: Option<String> = None;
    let mut parts = Vec::new();

    for block in content.as_blocks() {
        match translate_content_block(block, tool_names, &mut pending_thought_signature)? {
            Some(part) => parts.push(part),
            None => {}
        }
    }

    Ok(parts)
}

fn translate_content_block(
    block: ContentBlock,
    tool_names: &HashMap<String, String>,
    pending_thought_signature: &mut Option<String>,
) -> Result<Option<GeminiPart>> {
    match block {
        ContentBlock::Text { text } => {
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(GeminiPart::text(text)))
            }
        }

        ContentBlock::Thinking { thinking, signature } => {
            *pending_thought_signature = signature;
            Ok(Some(GeminiPart::thought(thinking)))
        }

        ContentBlock::ToolUse { id: _, name, input } => {
            let mut part = translate_tool_use(name, input);
            if let Some(signature) = pending_thought_signature.take() {
                if let GeminiPart::FunctionCall { thought_signature, .. } = &mut part {
                    *thought_signature = Some(signature);
                }
            }
            Ok(Some(part))
        }

        ContentBlock::ToolResult { tool_use_id, content, is_error } => {
            let name = tool_names.get(&tool_use_id).cloned().unwrap_or_else(|| UNKNOWN_TOOL.to_string());
            let flattened = content.map(|c| c.flatten()).unwrap_or_default();
            Ok(Some(translate_tool_result(name, flattened, is_error)))
        }

        ContentBlock::Image { source } => {
            let inline_data = crate::vision::translate_image_source(&source)?;
            Ok(Some(GeminiPart::InlineData { inline_data }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::anthropic::{Message, MessageContent};

    #[test]
    fn simple_message_translation() {
        let messages = vec![Message { role: "user".to_string(), content: MessageContent::Text("Hello, world!".to_string()) }];
        let result = translate_messages(&messages).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role, "user");
        assert_eq!(result[0].parts.len(), 1);
    }

    #[test]
    fn role_mapping() {
        let user = Message { role: "user".to_string(), content: MessageContent::Text("t".to_string()) };
        let assistant = Message { role: "assistant".to_string(), content: MessageContent::Text("t".to_string()) };
        assert_eq!(translate_messages(&[user]).unwrap()[0].role, "user");
        assert_eq!(translate_messages(&[assistant]).unwrap()[0].role, "model");
    }

    #[test]
    fn invalid_role_errors() {
        let msg = Message { role: "invalid".to_string(), content: MessageContent::Text("t".to_string()) };
        assert!(translate_messages(&[msg]).is_err());
    }

    #[test]
    fn adjacent_same_role_messages_merge() {
        let messages = vec![
            Message { role: "user".to_string(), content: MessageContent::Text("a".to_string()) },
            Message { role: "user".to_string(), content: MessageContent::Text("b".to_string()) },
        ];
        let result = translate_messages(&messages).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parts.len(), 2);
    }

    #[test]
    fn unresolved_tool_result_uses_sentinel() {
        let messages = vec![Message {
            role: "user".to_string(),
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_missing".to_string(),
                content: None,
                is_error: None,
            }]),
        }];
        let result = translate_messages(&messages).unwrap();
        match &result[0].parts[0] {
            GeminiPart::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "unknown_tool");
            }
            _ => panic!("expected FunctionResponse"),
        }
    }
}
