//! Gateway endpoints: connect, disconnect, status, tool calls and resource reads.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::mcp_client::{ConnectionSummary, GatewaySnapshot, ServerLaunch};

use super::{success, ApiError, ApiResult, SharedContext};

// ─── Request / Response Types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceRequest {
    pub uri: String,
}

/// Raw peer result.
#[derive(Debug, Serialize)]
pub struct PeerResult {
    pub result: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// `POST /api/mcp/connect`: replace any current session with a new one.
pub async fn connect(
    State(ctx): State<SharedContext>,
    payload: Result<Json<ServerLaunch>, JsonRejection>,
) -> ApiResult<ConnectionSummary> {
    let Json(launch) = payload?;
    if launch.command.trim().is_empty() {
        return Err(ApiError::new("command must not be empty"));
    }
    tracing::info!(command = %launch.command, args = ?launch.args, "connect requested");
    let summary = ctx.gateway.connect(&launch).await?;
    Ok(success(summary))
}

/// `POST /api/mcp/disconnect`: always succeeds.
pub async fn disconnect(State(ctx): State<SharedContext>) -> ApiResult<Empty> {
    ctx.gateway.disconnect().await;
    Ok(success(Empty {}))
}

/// `GET /api/mcp/status`
pub async fn status(State(ctx): State<SharedContext>) -> ApiResult<GatewaySnapshot> {
    Ok(success(ctx.gateway.snapshot()))
}

/// `POST /api/mcp/tools/call`
pub async fn call_tool(
    State(ctx): State<SharedContext>,
    payload: Result<Json<CallToolRequest>, JsonRejection>,
) -> ApiResult<PeerResult> {
    let Json(req) = payload?;
    let result = ctx.gateway.call_tool(&req.name, req.arguments).await?;
    Ok(success(PeerResult { result }))
}

/// `POST /api/mcp/resources/read`
pub async fn read_resource(
    State(ctx): State<SharedContext>,
    payload: Result<Json<ReadResourceRequest>, JsonRejection>,
) -> ApiResult<PeerResult> {
    let Json(req) = payload?;
    let result = ctx.gateway.read_resource(&req.uri).await?;
    Ok(success(PeerResult { result }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context, render};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_tool_while_idle_is_500_not_connected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let req = CallToolRequest {
            name: "similar_functions".into(),
            arguments: json!({}),
        };
        let (status, body) = render(call_tool(State(ctx), Ok(Json(req))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not connected to MCP server");
    }

    #[tokio::test]
    async fn test_read_resource_while_idle_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let req = ReadResourceRequest {
            uri: "greeting://world".into(),
        };
        let (status, body) =
            render(read_resource(State(context(dir.path())), Ok(Json(req))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Not connected to MCP server");
    }

    #[tokio::test]
    async fn test_disconnect_while_idle_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = render(disconnect(State(context(dir.path()))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = render(
            connect(State(context(dir.path())), Ok(Json(ServerLaunch::default()))).await,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "command must not be empty");
    }

    #[tokio::test]
    async fn test_connect_spawn_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let launch = ServerLaunch {
            command: "/definitely/not/a/binary".into(),
            ..ServerLaunch::default()
        };
        let (status, body) = render(connect(State(ctx.clone()), Ok(Json(launch))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(!ctx.gateway.is_connected());
    }

    #[tokio::test]
    async fn test_status_while_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (_, body) = render(status(State(context(dir.path()))).await).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["connected"], false);
        assert!(body["serverInfo"].is_null());
        assert_eq!(body["tools"], json!([]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_call_read_disconnect_round_trip() {
        use crate::mcp_client::testing::fake_peer;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let (status_code, body) = render(
            connect(
                State(ctx.clone()),
                Ok(Json(fake_peer("demo", &["similar_functions"]))),
            )
            .await,
        )
        .await;
        assert_eq!(status_code, StatusCode::OK, "{body}");
        assert_eq!(body["serverInfo"]["name"], "demo");
        assert_eq!(body["tools"][0]["name"], "similar_functions");
        assert_eq!(body["resources"][0]["uri"], "greeting://world");

        let req = CallToolRequest {
            name: "similar_functions".into(),
            arguments: json!({"description": "distance"}),
        };
        let (_, body) = render(call_tool(State(ctx.clone()), Ok(Json(req))).await).await;
        assert_eq!(body["result"]["content"][0]["text"], "ok");

        let req = ReadResourceRequest {
            uri: "greeting://world".into(),
        };
        let (_, body) = render(read_resource(State(ctx.clone()), Ok(Json(req))).await).await;
        assert_eq!(body["success"], true);
        assert!(body["result"].is_object());

        let (_, body) = render(status(State(ctx.clone())).await).await;
        assert_eq!(body["state"], "connected");

        render(disconnect(State(ctx.clone())).await).await;
        assert!(!ctx.gateway.is_connected());
    }
}
