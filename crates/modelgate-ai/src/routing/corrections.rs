//! Static rewrite table for model identifiers that providers no longer accept.

use super::candidate::Provider;

const CORRECTIONS: &[(Provider, &str, &str)] = &[
    (Provider::Anthropic, "claude-3-opus-20240229", "claude-opus-4-1"),
    (Provider::Anthropic, "claude-3-sonnet-20240229", "claude-sonnet-4-5"),
    (Provider::Anthropic, "claude-3-5-sonnet-latest", "claude-sonnet-4-5"),
    (Provider::Anthropic, "claude-3-5-sonnet-20240620", "claude-sonnet-4-5"),
    (Provider::OpenAI, "gpt-4-turbo-preview", "gpt-4.1"),
    (Provider::OpenAI, "gpt-4-vision-preview", "gpt-4.1"),
    (Provider::OpenAI, "gpt-4-32k", "gpt-4.1"),
    (Provider::OpenAI, "o1-preview", "o3"),
    (Provider::OpenAI, "o1-mini", "o4-mini"),
    (Provider::DeepSeek, "deepseek-coder", "deepseek-chat"),
];

/// Known-good replacement for a deprecated or invalid identifier.
pub fn corrected_model_name(provider: Provider, model_name: &str) -> Option<&'static str> {
    CORRECTIONS
        .iter()
        .find(|(p, from, _)| *p == provider && *from == model_name)
        .map(|(_, _, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_corrections() {
        assert_eq!(
            corrected_model_name(Provider::Anthropic, "claude-3-5-sonnet-latest"),
            Some("claude-sonnet-4-5")
        );
        assert_eq!(corrected_model_name(Provider::OpenAI, "o1-preview"), Some("o3"));
    }

    #[test]
    fn test_corrections_are_provider_scoped() {
        assert_eq!(corrected_model_name(Provider::OpenAI, "deepseek-coder"), None);
        assert_eq!(corrected_model_name(Provider::OpenAI, "gpt-4.1"), None);
    }

    #[test]
    fn test_corrections_do_not_chain() {
        for (provider, _, to) in CORRECTIONS {
            assert_eq!(corrected_model_name(*provider, to), None);
        }
    }
}
