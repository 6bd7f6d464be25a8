//! HTTP client for a running bridge, used by the CLI subcommands.
//!
//! A connection-level failure means the bridge itself is not running and is
//! reported as such; an error envelope from the bridge surfaces its `error`
//! string unchanged.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::mcp_client::ServerLaunch;

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:3002";

/// Whole-request limit; must cover a full chat pass.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Bridge server not running. Please start: mcp-bridge serve")]
    BridgeUnreachable { url: String, reason: String },

    /// `{success: false, error}` from the bridge.
    #[error("{0}")]
    Bridge(String),

    #[error("invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },
}

pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::InvalidResponse {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> Result<Value, RemoteError> {
        self.get("/api/health").await
    }

    pub async fn status(&self) -> Result<Value, RemoteError> {
        self.get("/api/mcp/status").await
    }

    pub async fn connect(&self, launch: &ServerLaunch) -> Result<Value, RemoteError> {
        self.post("/api/mcp/connect", launch).await
    }

    pub async fn disconnect(&self) -> Result<Value, RemoteError> {
        self.post("/api/mcp/disconnect", &serde_json::json!({})).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, RemoteError> {
        self.post(
            "/api/mcp/tools/call",
            &serde_json::json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value, RemoteError> {
        self.post("/api/mcp/resources/read", &serde_json::json!({ "uri": uri }))
            .await
    }

    pub async fn send_chat(&self, content: &str) -> Result<Value, RemoteError> {
        self.post("/api/chat/messages", &serde_json::json!({ "content": content }))
            .await
    }

    pub async fn history(&self) -> Result<Value, RemoteError> {
        self.get("/api/chat/messages").await
    }

    pub async fn clear_chat(&self) -> Result<Value, RemoteError> {
        self.post("/api/chat/clear", &serde_json::json!({})).await
    }

    pub async fn settings(&self) -> Result<Value, RemoteError> {
        self.get("/api/settings").await
    }

    /// Launch command saved in the bridge settings.
    pub async fn saved_launch(&self) -> Result<ServerLaunch, RemoteError> {
        let body = self.settings().await?;
        let settings = &body["settings"];
        serde_json::from_value(serde_json::json!({
            "command": settings["serverCommand"],
            "args": settings["serverArgs"],
            "environmentVariables": settings["environmentVariables"],
        }))
        .map_err(|e| RemoteError::InvalidResponse {
            reason: format!("unexpected settings shape: {e}"),
        })
    }

    // ─── Transport ──────────────────────────────────────────────────────

    async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let request = self.http.get(&url);
        self.send(&url, request).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let request = self.http.post(&url).json(body);
        self.send(&url, request).await
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                RemoteError::BridgeUnreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                RemoteError::InvalidResponse {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse {
                reason: format!("HTTP {status}: {e}"),
            })?;
        unwrap_envelope(body)
    }
}

/// Return the body of a `success: true` envelope, or its `error` string.
fn unwrap_envelope(body: Value) -> Result<Value, RemoteError> {
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(body),
        Some(false) => Err(RemoteError::Bridge(
            body.get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )),
        None => Err(RemoteError::InvalidResponse {
            reason: "missing `success` field".into(),
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use crate::commands::test_support::context;

    async fn serve_bridge(dir: &std::path::Path) -> String {
        let app = commands::router(context(dir));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_unwrap_envelope() {
        let ok = unwrap_envelope(serde_json::json!({"success": true, "x": 1})).unwrap();
        assert_eq!(ok["x"], 1);

        let err = unwrap_envelope(serde_json::json!({"success": false, "error": "nope"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");

        assert!(matches!(
            unwrap_envelope(serde_json::json!({})),
            Err(RemoteError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_message() {
        let client = BridgeClient::new("http://127.0.0.1:9").unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, RemoteError::BridgeUnreachable { .. }), "{err:?}");
        assert_eq!(
            err.to_string(),
            "Bridge server not running. Please start: mcp-bridge serve"
        );
    }

    #[tokio::test]
    async fn test_round_trip_against_local_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let client = BridgeClient::new(&serve_bridge(dir.path()).await).unwrap();

        let health = client.health().await.unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["connected"], false);

        let err = client.call_tool("x", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Not connected to MCP server");

        let reply = client.send_chat("hello").await.unwrap();
        assert_eq!(reply["message"]["content"], "echo: hello");

        let history = client.history().await.unwrap();
        assert_eq!(history["messages"].as_array().unwrap().len(), 2);

        client.clear_chat().await.unwrap();
        let history = client.history().await.unwrap();
        assert!(history["messages"].as_array().unwrap().is_empty());

        let launch = client.saved_launch().await.unwrap();
        assert_eq!(launch.command, "node");
    }
}
