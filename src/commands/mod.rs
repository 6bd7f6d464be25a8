//! HTTP façade: JSON endpoints over the gateway, the chat loop and settings.
//!
//! Every response body carries `success`. Any failure, "not connected"
//! included, is HTTP 500 with `{success: false, error}`.

pub mod chat;
pub mod health;
pub mod mcp;
pub mod settings;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppContext;

/// Handler state.
pub type SharedContext = Arc<AppContext>;

/// Build the façade router.
pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/mcp/connect", post(mcp::connect))
        .route("/api/mcp/disconnect", post(mcp::disconnect))
        .route("/api/mcp/status", get(mcp::status))
        .route("/api/mcp/tools/call", post(mcp::call_tool))
        .route("/api/mcp/resources/read", post(mcp::read_resource))
        .route(
            "/api/chat/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/api/chat/clear", post(chat::clear))
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}

// ─── Envelope ───────────────────────────────────────────────────────────────

/// `{success: true, ..payload}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

pub fn success<T: Serialize>(payload: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        payload,
    })
}

pub type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

/// Any failure surfaced to an HTTP caller.
///
/// Not `Display`; the blanket `From` below depends on that.
#[derive(Debug)]
pub struct ApiError(String);

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl<E: std::fmt::Display> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "success": false, "error": self.0 })),
        )
            .into_response()
    }
}

// ─── Test Support ───────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::response::IntoResponse;

    use crate::inference::{
        ContentBlock, InferenceError, LanguageModel, ModelRequest, ModelResponse,
    };
    use crate::mcp_client::SessionGateway;
    use crate::AppContext;

    use super::settings::SettingsStore;

    /// Replies with the last user message, prefixed.
    pub(crate) struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ModelResponse {
                blocks: vec![ContentBlock::Text {
                    text: format!("echo: {last}"),
                }],
                stop_reason: Some("end_turn".into()),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    pub(crate) fn context(dir: &std::path::Path) -> Arc<AppContext> {
        Arc::new(AppContext::new(
            Arc::new(SessionGateway::default()),
            Arc::new(EchoModel),
            SettingsStore::open(dir.join("settings.json")),
        ))
    }

    /// Render a handler result and split it into status and JSON body.
    pub(crate) async fn render(
        response: impl IntoResponse,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        let response = response.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_error_renders_500_envelope() {
        let err = ApiError::from(crate::mcp_client::McpError::NotConnected);
        let (status, body) = test_support::render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({"success": false, "error": "Not connected to MCP server"})
        );
    }

    #[tokio::test]
    async fn test_success_flattens_payload() {
        let (status, body) =
            test_support::render(success(serde_json::json!({"status": "ok"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"success": true, "status": "ok"}));
    }

    #[test]
    fn test_router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let _ = router(test_support::context(dir.path()));
    }
}
