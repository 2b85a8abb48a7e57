//! In-band tool-call protocol
//!
//! The endpoint only produces text, so tool use is negotiated inside the
//! conversation: the system message advertises the tools and demands a single
//! JSON envelope of the form
//!
//! ```text
//! {"tool_calls":[{"id":"call_1a2b3c4d","type":"function",
//!                 "function":{"name":"...","arguments":"{...}"}}]}
//! ```
//!
//! and the reply is decoded back into [`ToolCall`]s. Decoding never fails:
//! anything that is not a well-formed envelope is an ordinary assistant message.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Message, Tool, ToolCall};

/// Outcome of checking a call's argument string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRecovery {
    /// Already valid JSON, left untouched
    Valid,
    /// Rebuilt from `key: value` lines
    Recovered(String),
    /// Neither JSON nor `key: value` lines
    Unrecovered,
}

/// Fresh `call_<8 hex>` identifier
pub fn new_call_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..8])
}

/// System-message addendum describing the tools and the reply format
pub fn tool_instructions(tools: &[Tool]) -> String {
    let descriptions = tools
        .iter()
        .map(|tool| {
            let parameters = serde_json::to_string_pretty(&tool.function.parameters)
                .unwrap_or_else(|_| tool.function.parameters.to_string());
            format!(
                "Tool: {}\nDescription: {}\nParameters: {}",
                tool.function.name, tool.function.description, parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You have access to the following tools:

{descriptions}

To use a tool, respond ONLY with a JSON object in the following format:

```json
{{
  "tool_calls": [
    {{
      "id": "{id}",
      "type": "function",
      "function": {{
        "name": "tool_name",
        "arguments": "{{\"param1\": \"value1\", \"param2\": \"value2\"}}"
      }}
    }}
  ]
}}
```

Replace "tool_name" with the actual name of the tool you want to use, and provide the appropriate arguments.
Always use double quotes for JSON keys and values. Escape quotes in the arguments value.
DO NOT PROVIDE ANY TEXT OUTSIDE THE JSON OBJECT."#,
        descriptions = descriptions,
        id = new_call_id(),
    )
}

/// Append the tool addendum to the first system message, or prepend one
pub fn inject_tool_instructions(messages: &mut Vec<Message>, tools: &[Tool]) {
    let instructions = tool_instructions(tools);

    match messages.iter_mut().find(|m| m.role == "system") {
        Some(system) => {
            let merged = match system.content.take() {
                Some(existing) => format!("{}\n\n{}", existing, instructions),
                None => instructions,
            };
            system.content = Some(merged);
        }
        None => messages.insert(0, Message::system(instructions)),
    }
}

/// Body of the first code fence, preferring a `json` fence
fn fenced_block(text: &str) -> Option<&str> {
    let body = if let Some(start) = text.find("```json") {
        &text[start + "```json".len()..]
    } else {
        let start = text.find("```")?;
        let rest = &text[start + 3..];
        // drop a language tag such as ```JSON or ```javascript
        match rest.find('\n') {
            Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
            _ => rest,
        }
    };

    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// Locate a JSON document in model output: fenced first, then the raw text
fn extract_json(text: &str) -> Option<Value> {
    if let Some(block) = fenced_block(text) {
        match serde_json::from_str(block) {
            Ok(value) => return Some(value),
            Err(e) => debug!("Fenced block is not JSON: {}", e),
        }
    }

    match serde_json::from_str(text.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse tool call JSON: {}", e);
            None
        }
    }
}

/// Best-effort repair of an argument string
pub fn recover_arguments(raw: &str) -> ArgumentRecovery {
    if serde_json::from_str::<Value>(raw).is_ok() {
        return ArgumentRecovery::Valid;
    }

    let mut recovered = Map::new();
    for line in raw.trim().lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            recovered.insert(key.to_string(), Value::String(value.trim().to_string()));
        }
    }

    if recovered.is_empty() {
        ArgumentRecovery::Unrecovered
    } else {
        ArgumentRecovery::Recovered(Value::Object(recovered).to_string())
    }
}

fn normalize_arguments(name: &str, arguments: Option<&Value>) -> String {
    match arguments {
        Some(Value::String(raw)) => match recover_arguments(raw) {
            ArgumentRecovery::Valid => raw.clone(),
            ArgumentRecovery::Recovered(json) => {
                debug!("Recovered arguments for '{}' from key/value lines", name);
                json
            }
            ArgumentRecovery::Unrecovered => {
                warn!("Arguments for '{}' are not JSON, passing through", name);
                raw.clone()
            }
        },
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Backfill id/type and repair arguments of one envelope entry
fn normalize_call(entry: &Value) -> ToolCall {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(new_call_id);
    let call_type = entry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("function")
        .to_string();

    let function = entry.get("function");
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = normalize_arguments(&name, function.and_then(|f| f.get("arguments")));

    let mut call = ToolCall::new(id, name, arguments);
    call.call_type = call_type;
    call
}

/// Decode the tool calls carried by `text`, if it is a tool-call envelope
pub fn decode_tool_calls(text: &str) -> Option<Vec<ToolCall>> {
    let document = extract_json(text)?;
    let entries = match document.get("tool_calls") {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            warn!("'tool_calls' is not an array, treating response as text");
            return None;
        }
        None => {
            debug!("JSON response carries no 'tool_calls'");
            return None;
        }
    };

    if entries.is_empty() {
        debug!("Empty 'tool_calls' array, treating response as text");
        return None;
    }

    Some(entries.iter().map(normalize_call).collect())
}

/// Turn raw model output into an assistant message
pub fn decode_response(text: &str) -> Message {
    match decode_tool_calls(text) {
        Some(calls) => Message::from_tool_calls(None, calls),
        None => Message::assistant(text),
    }
}
