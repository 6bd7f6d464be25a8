//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility. Every variant is a failed model call from
//! the orchestration loop's point of view.

use thiserror::Error;

/// Errors that can occur during a model call.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The endpoint answered 2xx but the body was not a usable response.
    #[error("malformed model response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl InferenceError {
    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Short human-readable message for the conversation.
    ///
    /// Provider error bodies are JSON like `{"error":{"message":"..."}}`;
    /// the inner message is surfaced when present.
    pub fn user_message(&self) -> String {
        if let Some(body) = self.error_body() {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
                let inner = value
                    .pointer("/error/message")
                    .or_else(|| value.pointer("/message"))
                    .and_then(|m| m.as_str());
                if let (Some(message), InferenceError::HttpError { status, .. }) = (inner, self) {
                    return format!("HTTP {status}: {message}");
                }
            }
        }
        self.to_string()
    }
}
