// Router classification: prefix match against the single configured
// `{sourceModel, targetModel}` mapping (spec §4.6, §8 invariant 1).
//
// There is exactly one configured pair — not a per-model table — so
// classification is a single `starts_with` check, not a lookup.

use crate::config::MappingConfig;

/// The two dispositions a request can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Translate to Gemini and forward to `target_model`.
    Intercept { target_model: String },
    /// Relay bytes verbatim to the real Anthropic backend.
    Passthrough,
}

/// `model.startsWith(mapping.sourceModel)` (spec glossary: "Prefix match").
///
/// `"claude-haiku-4-5"` matches `"claude-haiku-4-5-20251001"` but not
/// `"claude-opus-4"`.
pub fn classify(model: &str, mapping: &MappingConfig) -> Disposition {
    if model.starts_with(mapping.source_model.as_str()) {
        Disposition::Intercept { target_model: mapping.target_model.clone() }
    } else {
        Disposition::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> MappingConfig {
        MappingConfig {
            source_model: "claude-haiku-4-5".to_string(),
            target_model: "gemini-2.5-pro".to_string(),
        }
    }

    #[test]
    fn prefix_match_intercepts() {
        let d = classify("claude-haiku-4-5-20251001", &mapping());
        assert_eq!(d, Disposition::Intercept { target_model: "gemini-2.5-pro".to_string() });
    }

    #[test]
    fn non_matching_prefix_passes_through() {
        assert_eq!(classify("claude-opus-4", &mapping()), Disposition::Passthrough);
    }

    #[test]
    fn exact_match_intercepts() {
        let d = classify("claude-haiku-4-5", &mapping());
        assert!(matches!(d, Disposition::Intercept { .. }));
    }

    #[test]
    fn empty_model_passes_through() {
        assert_eq!(classify("", &mapping()), Disposition::Passthrough);
    }
}
