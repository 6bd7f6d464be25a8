//! Response parsing: normalizes provider output to ordered `ContentBlock`s.
//!
//! Supports two formats (per `model.provider`):
//!
//! 1. **anthropic**: `content` is already an ordered list of `text` and
//!    `tool_use` blocks. Unknown block types (e.g. `thinking`) are skipped.
//!
//! 2. **openai**: `choices[0].message` carries optional `content` text and a
//!    `tool_calls` list whose `arguments` are a JSON-encoded string. The text
//!    becomes the first block, followed by the tool calls in order.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ContentBlock, ModelResponse};

// ─── Anthropic ───────────────────────────────────────────────────────────────

/// Parse a `POST /v1/messages` response body.
pub fn parse_anthropic_response(body: &str) -> Result<ModelResponse, InferenceError> {
    #[derive(Deserialize)]
    struct MessagesResponse {
        content: Vec<serde_json::Value>,
        stop_reason: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum WireBlock {
        Text {
            text: String,
        },
        ToolUse {
            id: Option<String>,
            name: String,
            #[serde(default)]
            input: serde_json::Value,
        },
    }

    let resp: MessagesResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse messages response: {e}"),
        })?;

    let mut blocks = Vec::with_capacity(resp.content.len());
    for raw in resp.content {
        let kind = raw
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        if kind != "text" && kind != "tool_use" {
            tracing::debug!(block_type = %kind, "skipping unsupported content block");
            continue;
        }

        let block: WireBlock =
            serde_json::from_value(raw).map_err(|e| InferenceError::MalformedResponse {
                reason: format!("invalid {kind} block: {e}"),
            })?;

        blocks.push(match block {
            WireBlock::Text { text } => ContentBlock::Text { text },
            WireBlock::ToolUse { id, name, input } => ContentBlock::ToolUse {
                id: id.unwrap_or_else(|| format!("toolu_{}", Uuid::new_v4())),
                name,
                input: normalize_arguments(input),
            },
        });
    }

    Ok(ModelResponse {
        blocks,
        stop_reason: resp.stop_reason,
    })
}

// ─── OpenAI ──────────────────────────────────────────────────────────────────

/// Parse a non-streaming `POST /chat/completions` response body.
pub fn parse_openai_response(body: &str) -> Result<ModelResponse, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Message,
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
        tool_calls: Option<Vec<WireToolCall>>,
    }

    #[derive(Deserialize)]
    struct WireToolCall {
        id: Option<String>,
        function: WireFunction,
    }

    #[derive(Deserialize)]
    struct WireFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse chat completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let mut blocks = Vec::new();
    if let Some(text) = choice.message.content.filter(|c| !c.is_empty()) {
        blocks.push(ContentBlock::Text { text });
    }

    for call in choice.message.tool_calls.unwrap_or_default() {
        let input = parse_arguments_string(&call.function.name, &call.function.arguments)?;
        blocks.push(ContentBlock::ToolUse {
            id: call.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: call.function.name,
            input,
        });
    }

    Ok(ModelResponse {
        blocks,
        stop_reason: choice.finish_reason,
    })
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Decode an OpenAI `arguments` string. Empty means no arguments.
fn parse_arguments_string(tool: &str, raw: &str) -> Result<serde_json::Value, InferenceError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map(normalize_arguments)
        .map_err(|e| InferenceError::MalformedResponse {
            reason: format!("invalid arguments JSON for tool '{tool}': {e}"),
        })
}

/// Tools take an object; `null` becomes `{}`.
fn normalize_arguments(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!({})
    } else {
        value
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_blocks_keep_emission_order() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "similar_functions", "input": {"description": "distance"}},
                {"type": "text", "text": " Then details."},
                {"type": "tool_use", "id": "toolu_2", "name": "function_details", "input": {"functionId": "func1"}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let resp = parse_anthropic_response(body).unwrap();
        assert_eq!(resp.blocks.len(), 4);
        assert_eq!(resp.tool_use_count(), 2);
        assert_eq!(resp.stop_reason.as_deref(), Some("tool_use"));
        match &resp.blocks[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "similar_functions");
                assert_eq!(input["description"], "distance");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        assert!(matches!(&resp.blocks[2], ContentBlock::Text { text } if text == " Then details."));
    }

    #[test]
    fn test_anthropic_skips_unknown_blocks() {
        let body = r#"{"content": [
            {"type": "thinking", "thinking": "hmm"},
            {"type": "text", "text": "Hi"}
        ], "stop_reason": "end_turn"}"#;
        let resp = parse_anthropic_response(body).unwrap();
        assert_eq!(resp.blocks, vec![ContentBlock::Text { text: "Hi".into() }]);
    }

    #[test]
    fn test_anthropic_rejects_non_message_body() {
        let err = parse_anthropic_response(r#"{"type":"error"}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_openai_text_then_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Checking callers.",
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "function_callers", "arguments": "{\"functionId\":\"f1\"}"}},
                        {"type": "function", "function": {"name": "function_callees", "arguments": ""}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp = parse_openai_response(body).unwrap();
        assert_eq!(resp.blocks.len(), 3);
        assert!(matches!(&resp.blocks[0], ContentBlock::Text { text } if text == "Checking callers."));
        match &resp.blocks[2] {
            ContentBlock::ToolUse { id, name, input } => {
                assert!(id.starts_with("call_"));
                assert_eq!(name, "function_callees");
                assert_eq!(input, &serde_json::json!({}));
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
    }

    #[test]
    fn test_openai_bad_arguments_are_malformed() {
        let body = r#"{"choices":[{"message":{"content":null,"tool_calls":[
            {"id":"c","function":{"name":"t","arguments":"{not json"}}
        ]},"finish_reason":"tool_calls"}]}"#;
        let err = parse_openai_response(body).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_openai_empty_choices() {
        let err = parse_openai_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }
}
