//! Transcript repair before dispatch.

use std::collections::HashSet;

use tracing::warn;

use crate::llm::{Message, Role};

pub const INTERRUPTED_TOOL_RESULT: &str =
    "Tool execution was interrupted before a result was recorded.";

/// Give every pending tool call a result.
///
/// Providers reject an assistant turn whose tool calls are not answered by
/// the tool-result turns directly after it. For each such call a placeholder
/// result is inserted after the results that do exist. Returns the number of
/// placeholders inserted.
pub fn repair_pending_tool_calls(messages: &mut Vec<Message>) -> usize {
    let mut repaired = 0;
    let mut i = 0;

    while i < messages.len() {
        if messages[i].role != Role::Assistant || messages[i].requested_tool_calls().is_empty() {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        let mut answered = HashSet::new();
        while end < messages.len() && messages[end].role == Role::Tool {
            if let Some(id) = &messages[end].tool_call_id {
                answered.insert(id.clone());
            }
            end += 1;
        }

        let placeholders: Vec<Message> = messages[i]
            .requested_tool_calls()
            .iter()
            .filter(|call| !answered.contains(&call.id))
            .map(|call| Message::tool_result(call.id.clone(), INTERRUPTED_TOOL_RESULT))
            .collect();

        if !placeholders.is_empty() {
            warn!(
                position = i,
                pending = placeholders.len(),
                "Repairing tool calls with no recorded result"
            );
            let inserted = placeholders.len();
            messages.splice(end..end, placeholders);
            repaired += inserted;
            end += inserted;
        }

        i = end;
    }

    repaired
}
