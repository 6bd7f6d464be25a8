//! Session Gateway: the single owner of the MCP session.
//!
//! State machine: `Idle → Connecting → Connected → Disconnecting → Idle`.
//! Connect and disconnect are serialized by one async lock, so at most one
//! live session exists at any time. A connect while connected tears the old
//! session down first. Tool calls and resource reads take a snapshot of the
//! active session and never hold the state lock across I/O.
//!
//! A monitor task per session returns the gateway to `Idle` (and clears the
//! catalog) if the peer's channel closes on its own. A connect or teardown
//! whose future is dropped midway also lands in `Idle`.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::Mutex;

use super::errors::McpError;
use super::lifecycle::{self, Session, SessionOptions};
use super::registry::CatalogCache;
use super::types::{ResourceDescriptor, ServerInfo, ServerLaunch, ToolDescriptor};

// ─── Public Types ────────────────────────────────────────────────────────────

/// Lifecycle state of the gateway's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// What a successful connect reports back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub server_info: ServerInfo,
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

/// Read-only view of the gateway at one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySnapshot {
    pub state: SessionState,
    pub connected: bool,
    pub server_info: Option<ServerInfo>,
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

// ─── Internal State ──────────────────────────────────────────────────────────

struct GatewayInner {
    state: SessionState,
    session: Option<Arc<Session>>,
    server_info: Option<ServerInfo>,
    catalog: CatalogCache,
    /// Bumped on every connect/teardown so a stale monitor cannot touch a newer session.
    generation: u64,
}

impl GatewayInner {
    /// Leave `Connected`: drop identity and catalog in the same critical section.
    fn detach(&mut self, next: SessionState) -> Option<Arc<Session>> {
        self.state = next;
        self.generation += 1;
        self.server_info = None;
        self.catalog.clear();
        self.session.take()
    }
}

/// Puts the gateway back in `Idle` unless disarmed.
///
/// Held across the awaits of a lifecycle step; dropping the step's future
/// drops the half-built session, whose child is killed on drop.
struct IdleOnDrop<'a> {
    inner: &'a RwLock<GatewayInner>,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn arm(inner: &'a RwLock<GatewayInner>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned = write(self.inner).detach(SessionState::Idle);
        drop(abandoned);
        tracing::warn!("MCP lifecycle step cancelled, gateway is idle");
    }
}

// ─── SessionGateway ──────────────────────────────────────────────────────────

/// Typed client over one MCP peer with an enforced session lifecycle.
pub struct SessionGateway {
    options: SessionOptions,
    /// Serializes connect/disconnect.
    lifecycle: Mutex<()>,
    inner: Arc<RwLock<GatewayInner>>,
}

impl SessionGateway {
    /// Create an idle gateway.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            lifecycle: Mutex::new(()),
            inner: Arc::new(RwLock::new(GatewayInner {
                state: SessionState::Idle,
                session: None,
                server_info: None,
                catalog: CatalogCache::new(),
                generation: 0,
            })),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Open a session to the peer described by `launch`.
    ///
    /// Any existing session is torn down first (errors ignored). On failure
    /// the gateway is back in `Idle` with empty catalogs before the error
    /// is returned.
    pub async fn connect(&self, launch: &ServerLaunch) -> Result<ConnectionSummary, McpError> {
        let _lifecycle = self.lifecycle.lock().await;

        self.teardown().await;

        {
            let mut inner = write(&self.inner);
            inner.state = SessionState::Connecting;
            inner.generation += 1;
        }
        let cancelled = IdleOnDrop::arm(&self.inner);

        tracing::info!(
            command = %launch.command,
            args = ?launch.args,
            env_overrides = launch.environment_variables.len(),
            "connecting to MCP server"
        );

        match lifecycle::open_session(launch, &self.options).await {
            Ok(session) => {
                let session = Arc::new(session);
                let (summary, generation) = {
                    let mut inner = write(&self.inner);
                    inner.state = SessionState::Connected;
                    inner.catalog.replace(session.catalog.clone());
                    inner.server_info = Some(session.server_info.clone());
                    inner.session = Some(Arc::clone(&session));
                    let summary = ConnectionSummary {
                        server_info: session.server_info.clone(),
                        tools: inner.catalog.tools(),
                        resources: inner.catalog.resources(),
                    };
                    (summary, inner.generation)
                };
                cancelled.disarm();
                self.spawn_monitor(&session, generation);
                tracing::info!(
                    server = %summary.server_info.name,
                    tools = summary.tools.len(),
                    resources = summary.resources.len(),
                    "connected to MCP server"
                );
                Ok(summary)
            }
            Err(e) => {
                cancelled.disarm();
                write(&self.inner).detach(SessionState::Idle);
                tracing::warn!(command = %launch.command, error = %e, "failed to connect to MCP server");
                Err(e)
            }
        }
    }

    /// Close the session if there is one. Always ends in `Idle`.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
    }

    /// Move to `Idle`, closing the current session. Caller holds the lifecycle lock.
    async fn teardown(&self) {
        let session = {
            let mut inner = write(&self.inner);
            if inner.session.is_none() && inner.state == SessionState::Idle {
                return;
            }
            inner.detach(SessionState::Disconnecting)
        };
        let cancelled = IdleOnDrop::arm(&self.inner);

        if let Some(session) = session {
            session.shutdown().await;
        }

        write(&self.inner).state = SessionState::Idle;
        cancelled.disarm();
        tracing::info!("disconnected from MCP server");
    }

    /// Watch for the peer going away without a disconnect.
    fn spawn_monitor(&self, session: &Arc<Session>, generation: u64) {
        let closed = session.closed();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            closed.await;
            let lost = {
                let mut guard = write(&inner);
                if guard.generation == generation && guard.state == SessionState::Connected {
                    guard.detach(SessionState::Idle)
                } else {
                    None
                }
            };
            if let Some(session) = lost {
                tracing::warn!(
                    server = %session.server_info.name,
                    "MCP server connection lost, gateway is idle"
                );
                session.shutdown().await;
            }
        });
    }

    // ─── Operations ──────────────────────────────────────────────────────

    /// Call a tool on the peer and return its raw result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let session = self.active_session()?;
        tracing::debug!(tool = %name, "calling MCP tool");
        session.call_tool(name, arguments).await.inspect_err(|e| {
            if e.is_connection_loss() {
                tracing::warn!(tool = %name, error = %e, "tool call lost its connection");
            } else {
                tracing::debug!(tool = %name, error = %e, "tool call failed");
            }
        })
    }

    /// Read a resource from the peer and return its raw result.
    pub async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        let session = self.active_session()?;
        tracing::debug!(uri = %uri, "reading MCP resource");
        session.read_resource(uri).await
    }

    fn active_session(&self) -> Result<Arc<Session>, McpError> {
        let inner = read(&self.inner);
        match (&inner.state, &inner.session) {
            (SessionState::Connected, Some(session)) => Ok(Arc::clone(session)),
            _ => Err(McpError::NotConnected),
        }
    }

    // ─── State Reads ─────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        read(&self.inner).state
    }

    /// Pure state read; never touches the transport.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        read(&self.inner).server_info.clone()
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        read(&self.inner).catalog.tools()
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        read(&self.inner).catalog.resources()
    }

    /// Consistent view of state, identity and catalog.
    pub fn snapshot(&self) -> GatewaySnapshot {
        let inner = read(&self.inner);
        GatewaySnapshot {
            state: inner.state,
            connected: inner.state == SessionState::Connected,
            server_info: inner.server_info.clone(),
            tools: inner.catalog.tools(),
            resources: inner.catalog.resources(),
        }
    }
}

impl Default for SessionGateway {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

fn read(lock: &RwLock<GatewayInner>) -> RwLockReadGuard<'_, GatewayInner> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<GatewayInner>) -> RwLockWriteGuard<'_, GatewayInner> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
