// Identifier minting for synthesized Anthropic-shaped objects (spec §4.1,
// §4.2): message ids, tool_use ids, and thinking signatures the gateway
// invents locally rather than forwards from upstream.

use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

fn random_base64url(len: usize) -> String {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).expect("failed to generate random bytes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// `"msg_cmm_" + base64url(12 random bytes)`.
pub fn new_message_id() -> String {
    format!("msg_cmm_{}", random_base64url(12))
}

/// `"toolu_cmm_" + base64url(12 random bytes)`.
pub fn new_tool_id() -> String {
    format!("toolu_cmm_{}", random_base64url(12))
}

/// `base64(64 random bytes)`, standard alphabet, used as a stand-in
/// thinking signature when Gemini doesn't supply one of its own.
pub fn new_thinking_signature() -> String {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; 64];
    rng.fill(&mut bytes).expect("failed to generate random bytes");
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_has_expected_prefix() {
        assert!(new_message_id().starts_with("msg_cmm_"));
    }

    #[test]
    fn tool_id_has_expected_prefix() {
        assert!(new_tool_id().starts_with("toolu_cmm_"));
    }

    #[test]
    fn ids_are_not_reused() {
        assert_ne!(new_message_id(), new_message_id());
        assert_ne!(new_tool_id(), new_tool_id());
    }

    #[test]
    fn thinking_signature_decodes_to_64_bytes() {
        let sig = new_thinking_signature();
        let decoded = base64::engine::general_purpose::STANDARD.decode(&sig).unwrap();
        assert_eq!(decoded.len(), 64);
    }
}
