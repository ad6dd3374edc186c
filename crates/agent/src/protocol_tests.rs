// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn non_json_lines_are_plain_output() {
    match classify_line("compiling coven v0.1.0") {
        AgentMessage::Output { text } => assert_eq!(text, "compiling coven v0.1.0"),
        other => panic!("expected output, got {other:?}"),
    }
}

#[test]
fn json_without_type_is_plain_output() {
    match classify_line(r#"{"foo": 1}"#) {
        AgentMessage::Output { text } => assert_eq!(text, r#"{"foo": 1}"#),
        other => panic!("expected output, got {other:?}"),
    }
}

#[test]
fn assistant_messages_extract_content_text() {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Done!"}]}}"#;
    match classify_line(line) {
        AgentMessage::Output { text } => assert_eq!(text, "Done!"),
        other => panic!("expected output, got {other:?}"),
    }
}

#[test]
fn tool_use_is_classified_with_name() {
    match classify_line(r#"{"type":"tool_use","name":"Bash"}"#) {
        AgentMessage::ToolCall { name } => assert_eq!(name, "Bash"),
        other => panic!("expected tool call, got {other:?}"),
    }
}

#[test]
fn questions_carry_prompt_and_options() {
    let line = r#"{"type":"question","prompt":"Which db?","options":["sqlite","postgres"]}"#;
    match classify_line(line) {
        AgentMessage::Question { question_type, prompt, options } => {
            assert_eq!(question_type, "question");
            assert_eq!(prompt, "Which db?");
            assert_eq!(options, vec!["sqlite".to_string(), "postgres".to_string()]);
        }
        other => panic!("expected question, got {other:?}"),
    }
}

#[test]
fn result_messages_surface_text() {
    match classify_line(r#"{"type":"result","result":"all done"}"#) {
        AgentMessage::Result { text } => assert_eq!(text, "all done"),
        other => panic!("expected result, got {other:?}"),
    }
}

#[test]
fn extracts_last_fenced_completion_block() {
    let output = r#"
Some narration.

```json
{"success": false, "error": "first attempt"}
```

More work...

```json
{"success": true, "summary": "fixed it", "outputs": {"pr": 42}}
```
"#;
    let block = extract_completion(output).unwrap();
    assert!(block.success);
    assert_eq!(block.summary.as_deref(), Some("fixed it"));
    assert_eq!(
        block.outputs.unwrap().get("pr"),
        Some(&serde_json::json!(42))
    );
}

#[test]
fn bare_fence_without_language_tag_is_accepted() {
    let output = "```\n{\"success\": true}\n```";
    assert!(extract_completion(output).unwrap().success);
}

#[yare::parameterized(
    no_fence       = { "no block here" },
    unclosed       = { "```json\n{\"success\": true}" },
    not_json       = { "```json\nnot json\n```" },
    missing_field  = { "```json\n{\"summary\": \"no success key\"}\n```" },
    string_success = { "```json\n{\"success\": \"yes\"}\n```" },
)]
fn invalid_blocks_yield_none(output: &str) {
    assert!(extract_completion(output).is_none());
}

#[test]
fn fenced_block_between_other_fences_is_found() {
    let output = "```rust\nfn main() {}\n```\n```json\n{\"success\": true}\n```";
    assert!(extract_completion(output).unwrap().success);
}

#[test]
fn completion_block_roundtrips() {
    let block = CompletionBlock {
        success: true,
        summary: Some("ok".to_string()),
        outputs: None,
        error: None,
    };
    let value = block.to_value();
    assert_eq!(value.get("success"), Some(&serde_json::json!(true)));
    let parsed: CompletionBlock = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, block);
}
