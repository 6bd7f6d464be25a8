//! Chat endpoints: the orchestration loop over HTTP.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::agent_core::Message;

use super::mcp::Empty;
use super::{success, ApiError, ApiResult, SharedContext};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub busy: bool,
    /// Last model failure, if the most recent pass hit one.
    pub error: Option<String>,
}

/// `POST /api/chat/messages`: run one pass and return the assistant message.
pub async fn send_message(
    State(ctx): State<SharedContext>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<SendMessageResponse> {
    let Json(req) = payload?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::new("message content must not be empty"));
    }
    let message = ctx.orchestrator.send_message(content).await?;
    Ok(success(SendMessageResponse { message }))
}

/// `GET /api/chat/messages`
pub async fn list_messages(State(ctx): State<SharedContext>) -> ApiResult<HistoryResponse> {
    Ok(success(HistoryResponse {
        messages: ctx.orchestrator.messages(),
        busy: ctx.orchestrator.is_busy(),
        error: ctx.orchestrator.last_error(),
    }))
}

/// `POST /api/chat/clear`
pub async fn clear(State(ctx): State<SharedContext>) -> ApiResult<Empty> {
    ctx.orchestrator.clear();
    tracing::info!("conversation cleared");
    Ok(success(Empty {}))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
