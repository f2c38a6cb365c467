//! Message ingestion.
//!
//! Transcripts arrive in several serialized shapes: chat-completions style
//! (`{"role": "assistant", ...}`), agent-framework style
//! (`{"type": "ai", ...}`), constructor-wrapped objects
//! (`{"lc": 1, "id": [.., "AIMessage"], "kwargs": {...}}`), and content-block
//! arrays carrying `tool_use` / `tool_result` blocks. All of them are turned
//! into [`Message`] here, once. Nothing past this boundary re-inspects the raw
//! payload to guess a role.

use serde_json::{Map, Value};

use crate::error::{AiError, Result};
use crate::llm::client::{Message, Role, ToolCall};

/// Parse a transcript: either a JSON array of messages or an object with a
/// `messages` array.
pub fn ingest_transcript(value: &Value) -> Result<Vec<Message>> {
    match value {
        Value::Array(items) => ingest_messages(items),
        Value::Object(obj) => match obj.get("messages") {
            Some(Value::Array(items)) => ingest_messages(items),
            _ => Err(AiError::InvalidFormat(
                "transcript object has no `messages` array".to_string(),
            )),
        },
        _ => Err(AiError::InvalidFormat(
            "transcript must be an array or an object".to_string(),
        )),
    }
}

/// Convert every serialized message, in order. A single serialized entry may
/// expand into several messages (one per `tool_result` block).
pub fn ingest_messages(values: &[Value]) -> Result<Vec<Message>> {
    let mut out = Vec::with_capacity(values.len());
    for (position, value) in values.iter().enumerate() {
        let messages = ingest_value(value)
            .map_err(|e| AiError::InvalidFormat(format!("message {position}: {e}")))?;
        out.extend(messages);
    }
    Ok(out)
}

fn ingest_value(value: &Value) -> std::result::Result<Vec<Message>, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    // Constructor-wrapped: fields live under `kwargs`, the class names the role.
    if let (Some(Value::Array(id)), Some(Value::Object(kwargs))) = (obj.get("id"), obj.get("kwargs"))
    {
        let class = id
            .last()
            .and_then(Value::as_str)
            .ok_or_else(|| "constructor id has no class name".to_string())?;
        let role = role_from_class(class)
            .ok_or_else(|| format!("unsupported message class '{class}'"))?;
        return build(role, kwargs);
    }

    let tag = obj
        .get("role")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| "message has neither `role` nor `type`".to_string())?;
    let role = role_from_tag(tag).ok_or_else(|| format!("unsupported message role '{tag}'"))?;
    build(role, obj)
}

fn role_from_tag(tag: &str) -> Option<Role> {
    match tag.to_lowercase().as_str() {
        "system" | "developer" => Some(Role::System),
        "user" | "human" => Some(Role::User),
        "assistant" | "ai" => Some(Role::Assistant),
        "tool" | "function" => Some(Role::Tool),
        _ => None,
    }
}

fn role_from_class(class: &str) -> Option<Role> {
    let base = class.strip_suffix("Chunk").unwrap_or(class);
    match base {
        "SystemMessage" => Some(Role::System),
        "HumanMessage" => Some(Role::User),
        "AIMessage" => Some(Role::Assistant),
        "ToolMessage" | "FunctionMessage" => Some(Role::Tool),
        _ => None,
    }
}

fn build(role: Role, obj: &Map<String, Value>) -> std::result::Result<Vec<Message>, String> {
    let content = obj.get("content").unwrap_or(&Value::Null);
    let blocks = content.as_array().map(Vec::as_slice).unwrap_or(&[]);

    // A user turn made of tool_result blocks is really a batch of tool results.
    let tool_results: Vec<Message> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
        .map(|b| {
            Message::tool_result(
                str_field(b, "tool_use_id").unwrap_or_default(),
                flatten_content(b.get("content").unwrap_or(&Value::Null)),
            )
        })
        .collect();
    if role == Role::User && !tool_results.is_empty() {
        return Ok(tool_results);
    }

    let mut message = Message {
        role,
        content: flatten_content(content),
        tool_call_id: obj
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        tool_calls: None,
    };

    if role == Role::Assistant {
        let mut calls = Vec::new();
        if let Some(Value::Array(raw_calls)) = obj.get("tool_calls") {
            for raw in raw_calls {
                calls.push(parse_tool_call(raw)?);
            }
        }
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                calls.push(parse_tool_call(block)?);
            }
        }
        if !calls.is_empty() {
            message.tool_calls = Some(calls);
        }
    }

    if role == Role::Tool && message.tool_call_id.is_none() {
        return Err("tool message without `tool_call_id`".to_string());
    }

    Ok(vec![message])
}

/// Accepts `{id, name, args}`, `{id, name, arguments}`, `{id, name, input}`
/// and `{id, function: {name, arguments}}`. String arguments are decoded as
/// JSON when possible.
fn parse_tool_call(raw: &Value) -> std::result::Result<ToolCall, String> {
    let source = raw.get("function").unwrap_or(raw);
    let id = str_field(raw, "id").ok_or_else(|| "tool call without `id`".to_string())?;
    let name = str_field(source, "name").ok_or_else(|| format!("tool call {id} without `name`"))?;
    let arguments = match source
        .get("arguments")
        .or_else(|| source.get("args"))
        .or_else(|| source.get("input"))
    {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Object(Map::new()),
    };
    Ok(ToolCall {
        id,
        name,
        arguments,
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn flatten_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) if part.get("type").and_then(Value::as_str) == Some("text") => {
                    str_field(part, "text")
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_shaped_messages() {
        let messages = ingest_messages(&[
            json!({"role": "system", "content": "rules"}),
            json!({"role": "user", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}),
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "read_file", "arguments": "{\"path\":\"x.rs\"}"}
                }]
            }),
            json!({"role": "tool", "tool_call_id": "call_1", "content": "fn main() {}"}),
        ])
        .unwrap();

        assert_eq!(messages[0], Message::system("rules"));
        assert_eq!(messages[1].content, "a\nb");
        assert_eq!(messages[2].requested_tool_calls()[0].arguments, json!({"path": "x.rs"}));
        assert_eq!(messages[3], Message::tool_result("call_1", "fn main() {}"));
    }

    #[test]
    fn test_type_shaped_messages() {
        let messages = ingest_messages(&[
            json!({"type": "human", "content": "hi"}),
            json!({"type": "ai", "content": "", "tool_calls": [{"id": "t1", "name": "ls", "args": {"dir": "."}}]}),
            json!({"type": "tool", "tool_call_id": "t1", "content": "a.rs"}),
        ])
        .unwrap();

        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].requested_tool_calls()[0].name, "ls");
        assert_eq!(messages[2].role, Role::Tool);
    }

    #[test]
    fn test_constructor_wrapped_messages() {
        let messages = ingest_messages(&[json!({
            "lc": 1,
            "type": "constructor",
            "id": ["langchain_core", "messages", "AIMessageChunk"],
            "kwargs": {"content": "partial"}
        })])
        .unwrap();
        assert_eq!(messages, vec![Message::assistant("partial")]);
    }

    #[test]
    fn test_content_block_tool_use_and_results() {
        let messages = ingest_messages(&[
            json!({"role": "assistant", "content": [
                {"type": "text", "text": "Checking both."},
                {"type": "tool_use", "id": "a", "name": "read", "input": {"p": 1}},
                {"type": "tool_use", "id": "b", "name": "read", "input": {"p": 2}}
            ]}),
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "a", "content": "one"},
                {"type": "tool_result", "tool_use_id": "b", "content": [{"type": "text", "text": "two"}]}
            ]}),
        ])
        .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "Checking both.");
        assert_eq!(messages[0].requested_tool_calls().len(), 2);
        assert_eq!(messages[1], Message::tool_result("a", "one"));
        assert_eq!(messages[2], Message::tool_result("b", "two"));
    }

    #[test]
    fn test_transcript_wrapper_and_errors() {
        let wrapped = json!({"messages": [{"role": "user", "content": "x"}]});
        assert_eq!(ingest_transcript(&wrapped).unwrap().len(), 1);

        let err = ingest_messages(&[json!({"role": "user", "content": "ok"}), json!({"content": "?"})])
            .unwrap_err();
        assert!(err.to_string().contains("message 1"));

        assert!(ingest_messages(&[json!({"role": "tool", "content": "orphan"})]).is_err());
        assert!(ingest_transcript(&json!("nope")).is_err());
    }
}
