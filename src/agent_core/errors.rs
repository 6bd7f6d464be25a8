//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model call for a pass failed. `message` is what the user sees.
    #[error("{message}")]
    ModelCallFailure {
        message: String,
        #[source]
        source: InferenceError,
    },

    /// Another pass is already running.
    #[error("a message is already being processed")]
    Busy,

    /// Tool call through the live session failed.
    #[error(transparent)]
    Tool(#[from] McpError),

    /// Tool result carried `isError: true`.
    #[error("{message}")]
    ToolReportedError { message: String },

    /// Stub catalog has no such tool.
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
}

impl From<InferenceError> for AgentError {
    fn from(source: InferenceError) -> Self {
        AgentError::ModelCallFailure {
            message: source.user_message(),
            source,
        }
    }
}
