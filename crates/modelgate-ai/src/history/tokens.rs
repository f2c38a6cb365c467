//! Token estimation and text truncation.
//!
//! Estimates are heuristic (bytes / 4 plus a per-message role overhead). They
//! are only used to decide when to compact, never for billing.

use crate::llm::Message;

pub const CHARS_PER_TOKEN: usize = 4;
pub const ROLE_OVERHEAD_TOKENS: usize = 4;

/// Estimated tokens for one message, tool-call payloads included.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut bytes = message.content.len();
    for call in message.requested_tool_calls() {
        bytes += call.id.len() + call.name.len();
        bytes += call.arguments.to_string().len();
    }
    if let Some(id) = &message.tool_call_id {
        bytes += id.len();
    }
    bytes / CHARS_PER_TOKEN + ROLE_OVERHEAD_TOKENS
}

pub fn estimate_tokens<'a>(messages: impl IntoIterator<Item = &'a Message>) -> usize {
    messages.into_iter().map(estimate_message_tokens).sum()
}

/// Keep the head and tail of `s` within `max_len` bytes, with a marker noting
/// how much was cut. Never splits a UTF-8 character.
pub fn middle_truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let marker = format!(
        "\n... [{} chars truncated] ...\n",
        s.len().saturating_sub(max_len)
    );
    if max_len <= marker.len() {
        return s[..floor_char_boundary(s, max_len)].to_string();
    }

    let available = max_len - marker.len();
    let head_end = floor_char_boundary(s, available / 2);
    let tail_start = ceil_char_boundary(s, s.len() - (available - available / 2));
    format!("{}{}{}", &s[..head_end], marker, &s[tail_start..])
}

fn floor_char_boundary(s: &str, pos: usize) -> usize {
    let mut i = pos.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, pos: usize) -> usize {
    let mut i = pos.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use serde_json::json;

    #[test]
    fn test_estimate_counts_content_and_overhead() {
        assert_eq!(estimate_message_tokens(&Message::user("")), ROLE_OVERHEAD_TOKENS);
        assert_eq!(
            estimate_message_tokens(&Message::user("a".repeat(400))),
            100 + ROLE_OVERHEAD_TOKENS
        );
    }

    #[test]
    fn test_estimate_includes_tool_payloads() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "read_file".to_string(),
            arguments: json!({"path": "src/main.rs"}),
        };
        let with_call = Message::assistant_with_tool_calls(None, vec![call]);
        assert!(estimate_message_tokens(&with_call) > ROLE_OVERHEAD_TOKENS);

        let messages = [Message::user("a".repeat(40)), Message::assistant("b".repeat(40))];
        assert_eq!(estimate_tokens(&messages), 2 * (10 + ROLE_OVERHEAD_TOKENS));
    }

    #[test]
    fn test_middle_truncate_keeps_both_ends() {
        let text = format!("HEAD{}TAIL", "x".repeat(1_000));
        let cut = middle_truncate(&text, 100);
        assert!(cut.len() <= 100);
        assert!(cut.starts_with("HEAD"));
        assert!(cut.ends_with("TAIL"));
        assert!(cut.contains("chars truncated"));
    }

    #[test]
    fn test_middle_truncate_short_input_and_tiny_budget() {
        assert_eq!(middle_truncate("short", 10), "short");
        assert_eq!(middle_truncate("abcdefghij", 3), "abc");
    }

    #[test]
    fn test_middle_truncate_respects_char_boundaries() {
        let text = "日本語".repeat(200);
        let cut = middle_truncate(&text, 101);
        assert!(cut.len() <= 101);
        assert!(cut.contains("truncated"));
    }
}
