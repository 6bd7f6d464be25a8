//! ToolRouter: dispatches model tool calls.
//!
//! While the gateway is connected, calls go to the live MCP session and the
//! model sees the live catalog. Otherwise calls fall through to a small
//! canned catalog so the loop can be exercised without a server; the model
//! is offered no tools in that state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::inference::ToolSchema;
use crate::mcp_client::SessionGateway;

use super::errors::AgentError;

// ─── ToolExecutor ───────────────────────────────────────────────────────────

/// Execute one named tool and describe the tools on offer.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, AgentError>;

    /// Tool schema for the next model call. Empty means no tool affordances.
    fn tool_schema(&self) -> Vec<ToolSchema>;
}

// ─── LiveExecutor ───────────────────────────────────────────────────────────

/// Executes through the Session Gateway.
pub struct LiveExecutor {
    gateway: Arc<SessionGateway>,
}

impl LiveExecutor {
    pub fn new(gateway: Arc<SessionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ToolExecutor for LiveExecutor {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        let result = self.gateway.call_tool(name, arguments).await?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(AgentError::ToolReportedError {
                message: reported_error_text(&result),
            });
        }
        Ok(result)
    }

    fn tool_schema(&self) -> Vec<ToolSchema> {
        self.gateway
            .tools()
            .into_iter()
            .map(|tool| ToolSchema {
                name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
            })
            .collect()
    }
}

/// Joined text blocks of an `isError` result.
fn reported_error_text(result: &Value) -> String {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        "tool reported an error".to_string()
    } else {
        text.join("\n")
    }
}

// ─── StubExecutor ───────────────────────────────────────────────────────────

/// Canned results for a code-search style catalog.
#[derive(Debug, Default)]
pub struct StubExecutor;

/// Tool names the stub answers.
pub const STUB_TOOLS: [&str; 4] = [
    "similar_functions",
    "function_callers",
    "function_callees",
    "function_details",
];

#[async_trait]
impl ToolExecutor for StubExecutor {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        let payload = match name {
            "similar_functions" => json!([
                {
                    "id": "func1",
                    "name": "calculateDistance",
                    "similarity": 0.85,
                    "summary": "Calculates distance between two points"
                },
                {
                    "id": "func2",
                    "name": "findNearbyPoints",
                    "similarity": 0.78,
                    "summary": "Finds points within a given radius"
                }
            ]),
            "function_callers" => json!([
                { "id": "caller1", "name": "processData" },
                { "id": "caller2", "name": "validateInput" }
            ]),
            "function_callees" => json!([
                { "id": "callee1", "name": "helper1" },
                { "id": "callee2", "name": "helper2" }
            ]),
            "function_details" => json!({
                "id": arguments.get("functionId").cloned().unwrap_or(Value::Null),
                "name": "exampleFunction",
                "code": "function exampleFunction() { return \"Hello\"; }",
                "summary": "An example function that returns a greeting"
            }),
            _ => {
                return Err(AgentError::UnknownTool {
                    name: name.to_string(),
                })
            }
        };

        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }

    fn tool_schema(&self) -> Vec<ToolSchema> {
        Vec::new()
    }
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Picks the live session or the stub per call, by gateway state.
pub struct ToolRouter {
    gateway: Arc<SessionGateway>,
    live: LiveExecutor,
    stub: StubExecutor,
}

impl ToolRouter {
    pub fn new(gateway: Arc<SessionGateway>) -> Self {
        Self {
            live: LiveExecutor::new(Arc::clone(&gateway)),
            stub: StubExecutor,
            gateway,
        }
    }

    fn active(&self) -> &dyn ToolExecutor {
        if self.gateway.is_connected() {
            &self.live
        } else {
            &self.stub
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRouter {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        let live = self.gateway.is_connected();
        tracing::debug!(tool = %name, live, "dispatching tool call");
        self.active().execute(name, arguments).await
    }

    fn tool_schema(&self) -> Vec<ToolSchema> {
        self.active().tool_schema()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(result: &Value) -> String {
        result["content"][0]["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_stub_answers_every_canned_tool() {
        let stub = StubExecutor;
        for name in STUB_TOOLS {
            let result = stub.execute(name, json!({})).await.unwrap();
            assert_eq!(result["content"][0]["type"], "text");
            let parsed: Value = serde_json::from_str(&text_of(&result)).unwrap();
            assert!(parsed.is_array() || parsed.is_object(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_stub_function_details_echoes_function_id() {
        let result = StubExecutor
            .execute("function_details", json!({"functionId": "func42"}))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(parsed["id"], "func42");
        assert_eq!(parsed["name"], "exampleFunction");
    }

    #[tokio::test]
    async fn test_stub_unknown_tool() {
        let err = StubExecutor.execute("delete_everything", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: delete_everything");
    }

    #[test]
    fn test_reported_error_text_joins_blocks() {
        let result = json!({
            "content": [{"type": "text", "text": "a"}, {"type": "image"}, {"type": "text", "text": "b"}],
            "isError": true
        });
        assert_eq!(reported_error_text(&result), "a\nb");
        assert_eq!(reported_error_text(&json!({"isError": true})), "tool reported an error");
    }

    #[tokio::test]
    async fn test_router_uses_stub_while_idle() {
        let router = ToolRouter::new(Arc::new(SessionGateway::default()));
        assert!(router.tool_schema().is_empty());
        let result = router.execute("similar_functions", json!({})).await.unwrap();
        assert!(text_of(&result).contains("calculateDistance"));
    }

    #[tokio::test]
    async fn test_live_executor_idle_is_not_connected() {
        let live = LiveExecutor::new(Arc::new(SessionGateway::default()));
        let err = live.execute("anything", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Not connected to MCP server");
    }

    #[cfg(unix)]
    mod live {
        use super::*;
        use crate::mcp_client::testing::fake_peer;

        #[tokio::test]
        async fn test_router_uses_live_session_when_connected() {
            let gateway = Arc::new(SessionGateway::default());
            gateway
                .connect(&fake_peer("live", &["echo", "soft_error"]))
                .await
                .unwrap();
            let router = ToolRouter::new(Arc::clone(&gateway));

            let names: Vec<String> = router.tool_schema().into_iter().map(|t| t.name).collect();
            assert_eq!(names, vec!["echo", "soft_error"]);

            let result = router.execute("echo", json!({})).await.unwrap();
            assert_eq!(text_of(&result), "ok");

            gateway.disconnect().await;
            let result = router.execute("similar_functions", json!({})).await.unwrap();
            assert!(text_of(&result).contains("calculateDistance"));
        }

        #[tokio::test]
        async fn test_live_is_error_result_becomes_failure() {
            let gateway = Arc::new(SessionGateway::default());
            gateway.connect(&fake_peer("live", &["soft_error"])).await.unwrap();
            let live = LiveExecutor::new(Arc::clone(&gateway));

            let err = live.execute("soft_error", json!({})).await.unwrap_err();
            assert!(matches!(err, AgentError::ToolReportedError { .. }));
            assert_eq!(err.to_string(), "bad input");

            gateway.disconnect().await;
        }

        #[tokio::test]
        async fn test_live_peer_error_keeps_peer_message() {
            let gateway = Arc::new(SessionGateway::default());
            gateway.connect(&fake_peer("live", &["fail_tool"])).await.unwrap();
            let live = LiveExecutor::new(Arc::clone(&gateway));

            let err = live.execute("fail_tool", json!({})).await.unwrap_err();
            assert_eq!(err.to_string(), "tool failed");

            gateway.disconnect().await;
        }
    }
}
