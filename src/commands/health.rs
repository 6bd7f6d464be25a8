//! Liveness check.

use axum::extract::State;
use serde::Serialize;

use super::{success, ApiResult, SharedContext};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connected: bool,
}

/// `GET /api/health`
pub async fn health(State(ctx): State<SharedContext>) -> ApiResult<HealthResponse> {
    Ok(success(HealthResponse {
        status: "ok",
        connected: ctx.gateway.is_connected(),
    }))
}
