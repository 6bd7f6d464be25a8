//! MCP Client: JSON-RPC over stdio to a single MCP server.
//!
//! This module handles:
//! - Spawning the server child process with a merged environment
//! - JSON-RPC 2.0 request/response correlation over process stdio
//! - The initialize handshake and tool/resource catalog fetch
//! - The session state machine behind the HTTP façade and the chat loop

pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{ConnectionSummary, GatewaySnapshot, SessionGateway, SessionState};
pub use errors::McpError;
pub use lifecycle::SessionOptions;
pub use registry::CatalogCache;
pub use types::{ResourceDescriptor, ServerInfo, ServerLaunch, ToolDescriptor};
