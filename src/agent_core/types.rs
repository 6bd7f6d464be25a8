//! Shared types for the agent core.
//!
//! Conversation messages and the per-message tool invocation records the
//! chat endpoints return.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::inference::Role;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single message in conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Tools executed while producing an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolInvocationRecord>>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None)
    }

    /// An assistant message. An empty record list is stored as `None`.
    pub fn assistant(content: impl Into<String>, records: Vec<ToolInvocationRecord>) -> Self {
        let tools = (!records.is_empty()).then_some(records);
        Self::new(Role::Assistant, content.into(), tools)
    }

    fn new(role: Role, content: String, tools: Option<Vec<ToolInvocationRecord>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            tools,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_records(&self) -> &[ToolInvocationRecord] {
        self.tools.as_deref().unwrap_or_default()
    }
}

// ─── Tool Invocation Records ────────────────────────────────────────────────

/// How a tool invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Result(serde_json::Value),
    Error(String),
}

/// One tool call made during an orchestration pass.
///
/// Serializes as `{name, arguments, result}` or `{name, arguments, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub name: String,
    pub arguments: serde_json::Value,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolInvocationRecord {
    pub fn succeeded(name: String, arguments: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            name,
            arguments,
            outcome: ToolOutcome::Result(result),
        }
    }

    pub fn failed(name: String, arguments: serde_json::Value, error: String) -> Self {
        Self {
            name,
            arguments,
            outcome: ToolOutcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_has_no_tools_field() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
        assert!(json.get("tools").is_none());
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_assistant_without_records_stores_none() {
        let msg = Message::assistant("done", vec![]);
        assert!(msg.tools.is_none());
        assert!(msg.tool_records().is_empty());
    }

    #[test]
    fn test_record_outcome_flattens_to_result_or_error() {
        let ok = ToolInvocationRecord::succeeded(
            "function_details".into(),
            serde_json::json!({"functionId": "f1"}),
            serde_json::json!({"content": []}),
        );
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["name"], "function_details");
        assert_eq!(json["arguments"]["functionId"], "f1");
        assert!(json.get("result").is_some());
        assert!(json.get("error").is_none());

        let err = ToolInvocationRecord::failed("x".into(), serde_json::json!({}), "boom".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
        assert!(err.is_error());
    }

    #[test]
    fn test_message_deserializes_from_wire_shape() {
        let msg = Message::assistant(
            "text",
            vec![ToolInvocationRecord::failed("t".into(), serde_json::json!({}), "e".into())],
        );
        let wire = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, msg);
    }
}
