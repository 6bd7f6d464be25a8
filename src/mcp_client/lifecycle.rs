//! Session lifecycle: spawn, handshake, catalog fetch, shutdown.
//!
//! A session is opened in one step: spawn the peer, run the `initialize`
//! handshake, send `notifications/initialized`, then list tools and
//! resources. If any step fails the half-open transport is closed before
//! the error is returned, so a caller never holds a partial session.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::errors::McpError;
use super::registry::CatalogCache;
use super::transport::{StdioTransport, TransportOptions};
use super::types::{
    error_codes, InitializeResult, ListResourcesResult, ListToolsResult, ResourceDescriptor,
    ServerInfo, ServerLaunch, ToolDescriptor,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Protocol revision requested in `initialize`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced to the peer.
pub const DEFAULT_CLIENT_NAME: &str = "mcp-bridge-client";

/// Upper bound on `nextCursor` pages followed for a single list call.
const MAX_LIST_PAGES: usize = 100;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Everything needed to open a session besides the launch command.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: String,
    /// Limit on the whole handshake + catalog fetch.
    pub init_timeout: Duration,
    pub transport: TransportOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            init_timeout: Duration::from_secs(30),
            transport: TransportOptions::default(),
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A live, initialized session with one peer.
pub struct Session {
    /// What was launched.
    pub launch: ServerLaunch,
    /// Identity negotiated during `initialize`.
    pub server_info: ServerInfo,
    /// Catalog listed right after the handshake.
    pub catalog: CatalogCache,
    transport: StdioTransport,
}

impl Session {
    /// `tools/call` with the peer's raw result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let arguments = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments
        };
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.transport.request("tools/call", Some(params)).await
    }

    /// `resources/read` with the peer's raw result.
    pub async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        self.transport
            .request("resources/read", Some(serde_json::json!({ "uri": uri })))
            .await
    }

    /// Resolves when the peer's channel closes for any reason.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.transport.closed()
    }

    pub fn pid(&self) -> Option<u32> {
        self.transport.pid()
    }

    pub fn pending_requests(&self) -> usize {
        self.transport.pending_count()
    }

    /// Close the transport. Never fails; problems are logged by the transport.
    pub async fn shutdown(&self) {
        tracing::info!(
            server = %self.server_info.name,
            command = %self.launch.command,
            args = ?self.launch.args,
            pid = ?self.transport.pid(),
            pending = self.pending_requests(),
            already_closed = self.transport.is_closed(),
            "shutting down MCP session"
        );
        self.transport.close().await;
    }
}

// ─── Opening ─────────────────────────────────────────────────────────────────

/// Spawn the peer and bring a session fully up.
pub async fn open_session(
    launch: &ServerLaunch,
    options: &SessionOptions,
) -> Result<Session, McpError> {
    let transport = StdioTransport::open(
        &launch.command,
        &launch.args,
        &launch.environment_variables,
        options.transport,
    )?;

    match tokio::time::timeout(options.init_timeout, handshake(&transport, options)).await {
        Ok(Ok((server_info, catalog))) => {
            tracing::info!(
                server = %server_info.name,
                version = %server_info.version,
                protocol = %server_info.protocol_version,
                tools = catalog.tool_count(),
                resources = catalog.resource_count(),
                "MCP session initialized"
            );
            Ok(Session {
                launch: launch.clone(),
                server_info,
                catalog,
                transport,
            })
        }
        Ok(Err(e)) => {
            transport.close().await;
            Err(e)
        }
        Err(_) => {
            transport.close().await;
            Err(McpError::HandshakeFailure {
                reason: format!(
                    "initialization timed out after {}s",
                    options.init_timeout.as_secs()
                ),
            })
        }
    }
}

/// Perform the MCP initialization handshake and fetch the catalog.
async fn handshake(
    transport: &StdioTransport,
    options: &SessionOptions,
) -> Result<(ServerInfo, CatalogCache), McpError> {
    let params = serde_json::json!({
        "protocolVersion": options.protocol_version,
        "capabilities": {},
        "clientInfo": {
            "name": options.client_name,
            "version": options.client_version,
        },
    });

    let raw = transport
        .request("initialize", Some(params))
        .await
        .map_err(handshake_error)?;
    let init: InitializeResult = parse_reply("initialize", raw)?;

    transport
        .notify("notifications/initialized", None)
        .await
        .map_err(handshake_error)?;

    let tools = if init.has_capability("tools") {
        list_tools(transport).await.map_err(handshake_error)?
    } else {
        Vec::new()
    };

    let resources = if init.has_capability("resources") {
        list_resources(transport).await.map_err(handshake_error)?
    } else {
        Vec::new()
    };

    Ok((init.server_info(), CatalogCache::from_listing(tools, resources)))
}

/// Errors during bring-up are reported as a failed handshake.
fn handshake_error(err: McpError) -> McpError {
    match err {
        McpError::ToolExecutionError { message, code, .. } => McpError::HandshakeFailure {
            reason: format!("[{code}] {message}"),
        },
        McpError::TransportLost { reason } => McpError::HandshakeFailure {
            reason: format!("server exited during initialization: {reason}"),
        },
        other => other,
    }
}

fn parse_reply<T: DeserializeOwned>(method: &str, raw: serde_json::Value) -> Result<T, McpError> {
    serde_json::from_value(raw).map_err(|e| McpError::MalformedResponse {
        reason: format!("failed to parse {method} response: {e}"),
    })
}

// ─── Catalog Listing ─────────────────────────────────────────────────────────

/// A paginated list reply.
trait ListPage: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl ListPage for ListToolsResult {
    type Item = ToolDescriptor;
    fn into_parts(self) -> (Vec<ToolDescriptor>, Option<String>) {
        (self.tools, self.next_cursor)
    }
}

impl ListPage for ListResourcesResult {
    type Item = ResourceDescriptor;
    fn into_parts(self) -> (Vec<ResourceDescriptor>, Option<String>) {
        (self.resources, self.next_cursor)
    }
}

/// Follow `nextCursor` until the peer stops returning one.
async fn list_all<P: ListPage>(
    transport: &StdioTransport,
    method: &str,
) -> Result<Vec<P::Item>, McpError> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
        let raw = transport.request(method, params).await?;
        let (page, next) = parse_reply::<P>(method, raw)?.into_parts();
        items.extend(page);

        match next {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => return Ok(items),
        }
    }

    tracing::warn!(method, pages = MAX_LIST_PAGES, "stopped following list cursor");
    Ok(items)
}

async fn list_tools(transport: &StdioTransport) -> Result<Vec<ToolDescriptor>, McpError> {
    list_all::<ListToolsResult>(transport, "tools/list").await
}

/// Resources are optional: a peer without `resources/list` yields an empty set.
async fn list_resources(transport: &StdioTransport) -> Result<Vec<ResourceDescriptor>, McpError> {
    match list_all::<ListResourcesResult>(transport, "resources/list").await {
        Err(McpError::ToolExecutionError { code, .. }) if code == error_codes::METHOD_NOT_FOUND => {
            tracing::debug!("server does not implement resources/list");
            Ok(Vec::new())
        }
        other => other,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
