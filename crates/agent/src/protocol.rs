// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent JSONL protocol: line classification and the completion block.

use serde::{Deserialize, Serialize};

/// A classified line from the agent's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Plain output (non-JSON lines, or message text from the protocol)
    Output { text: String },
    /// The agent invoked a tool
    ToolCall { name: String },
    /// The agent asked the user something; routed without blocking
    Question { question_type: String, prompt: String, options: Vec<String> },
    /// A structured result message (completion extraction looks here too)
    Result { text: String },
}

/// The fenced JSON block agents must end their output with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionBlock {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionBlock {
    /// The parsed object as a JSON value for the step result.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Classify one stdout line.
///
/// JSON objects are dispatched by their `type` field; anything else is
/// plain output.
pub fn classify_line(line: &str) -> AgentMessage {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return AgentMessage::Output { text: line.to_string() };
    };
    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        return AgentMessage::Output { text: line.to_string() };
    };

    match kind {
        "question" => AgentMessage::Question {
            question_type: value
                .get("question_type")
                .and_then(|v| v.as_str())
                .unwrap_or("question")
                .to_string(),
            prompt: value
                .get("prompt")
                .or_else(|| value.get("question"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            options: value
                .get("options")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        },
        "tool_use" | "tool_call" => AgentMessage::ToolCall {
            name: value
                .get("name")
                .or_else(|| value.get("tool"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        },
        "result" => AgentMessage::Result { text: message_text(&value) },
        // "assistant", "user", "system", and anything future: surface the
        // readable text.
        _ => AgentMessage::Output { text: message_text(&value) },
    }
}

/// Pull human-readable text out of a protocol message.
///
/// Handles both `{"message": "text"}` and the nested content-block form
/// `{"message": {"content": [{"type": "text", "text": ...}]}}`.
fn message_text(value: &serde_json::Value) -> String {
    let message = value.get("message").or_else(|| value.get("result")).unwrap_or(value);
    if let Some(text) = message.as_str() {
        return text.to_string();
    }
    if let Some(content) = message.get("content") {
        if let Some(text) = content.as_str() {
            return text.to_string();
        }
        if let Some(blocks) = content.as_array() {
            return blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n");
        }
    }
    message.to_string()
}

/// Extract the authoritative completion block from accumulated output:
/// the last fenced JSON object carrying a boolean `success`.
///
/// Both ```` ```json ```` and bare ```` ``` ```` fences are accepted.
pub fn extract_completion(output: &str) -> Option<CompletionBlock> {
    let mut last = None;
    let mut rest = output;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        let candidate = body[..close].trim();
        if let Ok(block) = serde_json::from_str::<CompletionBlock>(candidate) {
            last = Some(block);
        }
        rest = &body[close + 3..];
    }
    last
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
