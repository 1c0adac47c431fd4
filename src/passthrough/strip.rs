// `strip_thinking_blocks` (spec §4.5, §4.6): the passthrough retry-body
// transform. Removes `thinking` blocks from assistant messages; an assistant
// message left with an empty `content` array by the strip is kept as-is —
// only a message that was already empty before stripping would ever be
// dropped, and nothing here drops it either, so there is no special case.

pub fn strip_thinking_blocks(body: &[u8]) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return body.to_vec();
    };

    if let Some(messages) = value.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for message in messages.iter_mut() {
            if message.get("role").and_then(|r| r.as_str()) != Some("assistant") {
                continue;
            }
            if let Some(content) = message.get_mut("content").and_then(|c| c.as_array_mut()) {
                content.retain(|block| block.get("type").and_then(|t| t.as_str()) != Some("thinking"));
            }
        }
    }

    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_thinking_blocks_from_assistant_messages() {
        let body = json!({
            "model": "claude-opus-4",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "...", "signature": "bad"},
                    {"type": "text", "text": "hello"}
                ]}
            ]
        });

        let stripped = strip_thinking_blocks(&serde_json::to_vec(&body).unwrap());
        let parsed: serde_json::Value = serde_json::from_slice(&stripped).unwrap();
        let content = parsed["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "text");
    }

    #[test]
    fn leaves_user_message_thinking_like_blocks_untouched() {
        let body = json!({
            "messages": [
                {"role": "user", "content": [{"type": "thinking", "thinking": "not really"}]}
            ]
        });

        let stripped = strip_thinking_blocks(&serde_json::to_vec(&body).unwrap());
        let parsed: serde_json::Value = serde_json::from_slice(&stripped).unwrap();
        assert_eq!(parsed["messages"][0]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn an_all_thinking_assistant_message_is_kept_with_empty_content() {
        let body = json!({
            "messages": [
                {"role": "assistant", "content": [{"type": "thinking", "thinking": "x"}]}
            ]
        });

        let stripped = strip_thinking_blocks(&serde_json::to_vec(&body).unwrap());
        let parsed: serde_json::Value = serde_json::from_slice(&stripped).unwrap();
        assert!(parsed["messages"][0]["content"].as_array().unwrap().is_empty());
    }

    #[test]
    fn malformed_json_passes_through_unchanged() {
        let raw = b"not json";
        assert_eq!(strip_thinking_blocks(raw), raw);
    }
}
