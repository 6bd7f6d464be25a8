//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur while talking to the MCP peer.
#[derive(Debug, Error)]
pub enum McpError {
    /// The peer process could not be started.
    #[error("failed to spawn MCP server '{command}': {reason}")]
    SpawnFailure {
        command: String,
        reason: String,
    },

    /// The initialize handshake (or the catalog fetch that follows it) failed.
    #[error("MCP handshake failed: {reason}")]
    HandshakeFailure {
        reason: String,
    },

    /// The channel or the peer process died while requests were outstanding.
    #[error("connection to MCP server lost: {reason}")]
    TransportLost {
        reason: String,
    },

    /// An operation needed a live session and there was none.
    #[error("Not connected to MCP server")]
    NotConnected,

    /// The peer answered with a JSON-RPC error object.
    #[error("{message}")]
    ToolExecutionError {
        message: String,
        code: i32,
        data: Option<serde_json::Value>,
    },

    /// The peer's reply did not have the expected shape.
    #[error("malformed response from MCP server: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// A request did not complete within the configured per-request timeout.
    #[error("MCP request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        timeout_ms: u64,
    },
}

impl McpError {
    /// Whether this error means the session itself is gone (as opposed to one call failing).
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, McpError::TransportLost { .. })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
