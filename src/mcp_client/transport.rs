//! JSON-RPC over stdio transport.
//!
//! Owns one MCP peer child process and the line-delimited channel to it:
//! - Writing JSON-RPC requests and notifications to stdin
//! - A reader task that routes stdout frames to waiting callers by id
//! - Forwarding the peer's stderr into the log
//!
//! When stdout closes or errors, every pending request fails with
//! `TransportLost` and the `closed()` signal fires.

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::errors::McpError;
use super::types::{error_codes, FrameKind, InboundFrame, JsonRpcNotification, JsonRpcRequest};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long `close()` lets the reader task drain before aborting it.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Options ─────────────────────────────────────────────────────────────────

/// Timeouts and limits applied by the transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Per-request limit. `None` waits for as long as the peer takes.
    pub request_timeout: Option<Duration>,
    /// How long `close()` waits for the child to exit after stdin closes.
    pub shutdown_timeout: Duration,
    /// Longest stdout line accepted from the peer; longer frames are dropped.
    pub max_frame_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(60)),
            shutdown_timeout: Duration::from_secs(5),
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

// ─── Pending Requests ────────────────────────────────────────────────────────

type Waiter = oneshot::Sender<Result<InboundFrame, McpError>>;

/// Correlation id → waiting caller.
///
/// Once `closed` is set no new waiters are accepted, so a request racing
/// the reader's shutdown can never be left without an answer.
#[derive(Default)]
struct PendingTable {
    closed: Option<String>,
    waiters: HashMap<u64, Waiter>,
}

impl PendingTable {
    fn register(
        &mut self,
        id: u64,
    ) -> Result<oneshot::Receiver<Result<InboundFrame, McpError>>, McpError> {
        if let Some(reason) = &self.closed {
            return Err(McpError::TransportLost {
                reason: reason.clone(),
            });
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Hand a response to its waiter. Returns `false` if nobody was waiting.
    fn resolve(&mut self, id: u64, frame: InboundFrame) -> bool {
        match self.waiters.remove(&id) {
            Some(tx) => {
                // Receiver gone means the caller timed out; nothing to do.
                let _ = tx.send(Ok(frame));
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: u64) {
        self.waiters.remove(&id);
    }

    /// Fail every waiter with `TransportLost` and refuse new ones.
    fn fail_all(&mut self, reason: &str) -> usize {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        let count = self.waiters.len();
        for (_, tx) in self.waiters.drain() {
            let _ = tx.send(Err(McpError::TransportLost {
                reason: reason.to_string(),
            }));
        }
        count
    }
}

fn lock_pending(pending: &std::sync::Mutex<PendingTable>) -> std::sync::MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Environment ─────────────────────────────────────────────────────────────

/// The environment for the peer: this process's variables with `overrides` on top.
pub fn merged_environment(overrides: &HashMap<String, String>) -> HashMap<OsString, OsString> {
    let mut env: HashMap<OsString, OsString> = std::env::vars_os().collect();
    for (key, value) in overrides {
        env.insert(OsString::from(key), OsString::from(value));
    }
    env
}

// ─── Transport ───────────────────────────────────────────────────────────────

type SharedWriter = Arc<Mutex<Option<ChildStdin>>>;

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    command: String,
    pid: Option<u32>,
    options: TransportOptions,
    next_id: AtomicU64,
    writer: SharedWriter,
    child: Mutex<Option<Child>>,
    pending: Arc<std::sync::Mutex<PendingTable>>,
    closed_rx: watch::Receiver<bool>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn `command` with `args` and start routing its stdout.
    ///
    /// The child sees this process's environment merged with `env_overrides`.
    pub fn open(
        command: &str,
        args: &[String],
        env_overrides: &HashMap<String, String>,
        options: TransportOptions,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .env_clear()
            .envs(merged_environment(env_overrides))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailure {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailure {
            command: command.to_string(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailure {
            command: command.to_string(),
            reason: "failed to capture stdout".into(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            let server = command.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, line = %line, "server stderr");
                }
            });
        }

        let pid = child.id();
        let writer: SharedWriter = Arc::new(Mutex::new(Some(stdin)));
        let pending = Arc::new(std::sync::Mutex::new(PendingTable::default()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_task = tokio::spawn(read_loop(
            command.to_string(),
            stdout,
            options.max_frame_bytes,
            Arc::clone(&pending),
            Arc::clone(&writer),
            closed_tx,
        ));

        tracing::debug!(server = %command, pid = ?pid, "spawned MCP server process");

        Ok(Self {
            command: command.to_string(),
            pid,
            options,
            next_id: AtomicU64::new(1),
            writer,
            child: Mutex::new(Some(child)),
            pending,
            closed_rx,
            reader_task: std::sync::Mutex::new(Some(reader_task)),
        })
    }

    /// OS process id of the peer, if it was available at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).waiters.len()
    }

    /// Whether the channel has been lost or closed.
    pub fn is_closed(&self) -> bool {
        lock_pending(&self.pending).closed.is_some()
    }

    /// Resolves once the peer's stdout has closed (exit, crash, or `close()`).
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.closed_rx.clone();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// Send a JSON-RPC request and wait for the response with the same id.
    ///
    /// A JSON-RPC error object from the peer becomes `ToolExecutionError`.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = lock_pending(&self.pending).register(id)?;

        if let Err(e) = self.write_frame(&JsonRpcRequest::new(id, method, params)).await {
            lock_pending(&self.pending).remove(id);
            return Err(e);
        }

        let outcome = match self.options.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    lock_pending(&self.pending).remove(id);
                    return Err(McpError::Timeout {
                        method: method.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        let frame = outcome.map_err(|_| McpError::TransportLost {
            reason: "response channel dropped".into(),
        })??;

        frame.into_result().map_err(|e| McpError::ToolExecutionError {
            message: e.message,
            code: e.code,
            data: e.data,
        })
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.write_frame(&JsonRpcNotification::new(method, params)).await
    }

    async fn write_frame<T: Serialize>(&self, frame: &T) -> Result<(), McpError> {
        let line = encode_line(frame)?;
        write_line(&self.writer, &line).await
    }

    /// Close stdin, wait briefly for the peer to exit, then kill it.
    ///
    /// Idempotent and best-effort: failures are logged, never returned.
    /// Any request still pending afterwards fails with `TransportLost`.
    pub async fn close(&self) {
        let stdin = self.writer.lock().await.take();
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.shutdown().await {
                tracing::warn!(server = %self.command, error = %e, "failed to close server stdin");
            }
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match tokio::time::timeout(self.options.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(server = %self.command, status = %status, "server exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(server = %self.command, error = %e, "failed to wait for server exit");
                }
                Err(_) => {
                    tracing::warn!(
                        server = %self.command,
                        timeout_secs = self.options.shutdown_timeout.as_secs(),
                        "server did not exit after stdin closed, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(server = %self.command, error = %e, "failed to kill server");
                    }
                }
            }
        }

        let failed = lock_pending(&self.pending).fail_all("transport closed");
        if failed > 0 {
            tracing::warn!(server = %self.command, failed, "failed pending requests on close");
        }

        let reader = self
            .reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut handle) = reader {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

// ─── Reader Task ─────────────────────────────────────────────────────────────

async fn read_loop(
    server: String,
    stdout: ChildStdout,
    max_frame_bytes: usize,
    pending: Arc<std::sync::Mutex<PendingTable>>,
    writer: SharedWriter,
    closed_tx: watch::Sender<bool>,
) {
    let mut frames = FramedRead::new(stdout, LinesCodec::new_with_max_length(max_frame_bytes));

    let reason = loop {
        match frames.next().await {
            Some(Ok(line)) => route_line(&server, &line, &pending, &writer).await,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(server = %server, max_frame_bytes, "dropping oversized frame from server");
            }
            Some(Err(LinesCodecError::Io(e))) => break format!("failed to read from stdout: {e}"),
            None => break "server stdout closed (process may have exited)".to_string(),
        }
    };

    let failed = lock_pending(&pending).fail_all(&reason);
    if failed > 0 {
        tracing::warn!(server = %server, failed, reason = %reason, "connection lost with requests in flight");
    } else {
        tracing::info!(server = %server, reason = %reason, "server channel closed");
    }
    let _ = closed_tx.send(true);
}

async fn route_line(
    server: &str,
    line: &str,
    pending: &std::sync::Mutex<PendingTable>,
    writer: &SharedWriter,
) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let frame: InboundFrame = match serde_json::from_str(trimmed) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!(server = %server, line = %trimmed, "skipping non-JSON stdout line");
            return;
        }
    };

    match frame.kind() {
        FrameKind::Response(id) => {
            if !lock_pending(pending).resolve(id, frame) {
                tracing::debug!(server = %server, id, "dropping response with no pending request");
            }
        }
        FrameKind::PeerRequest(id) => {
            tracing::debug!(server = %server, method = ?frame.method, "rejecting server-initiated request");
            let reply = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": error_codes::METHOD_NOT_FOUND, "message": "Method not found" },
            });
            let sent = match encode_line(&reply) {
                Ok(line) => write_line(writer, &line).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::debug!(server = %server, error = %e, "failed to answer server request");
            }
        }
        FrameKind::Notification => {
            tracing::debug!(server = %server, method = ?frame.method, "ignoring server notification");
        }
        FrameKind::Invalid => {
            tracing::debug!(server = %server, line = %trimmed, "ignoring frame without id or method");
        }
    }
}

// ─── Framing Helpers ─────────────────────────────────────────────────────────

fn encode_line<T: Serialize>(frame: &T) -> Result<String, McpError> {
    let mut json = serde_json::to_string(frame).map_err(|e| McpError::MalformedResponse {
        reason: format!("failed to serialize frame: {e}"),
    })?;
    json.push('\n');
    Ok(json)
}

async fn write_line(writer: &SharedWriter, line: &str) -> Result<(), McpError> {
    let mut guard = writer.lock().await;
    let stdin = guard.as_mut().ok_or_else(|| McpError::TransportLost {
        reason: "transport closed".into(),
    })?;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| McpError::TransportLost {
            reason: format!("failed to write to stdin: {e}"),
        })?;
    stdin.flush().await.map_err(|e| McpError::TransportLost {
        reason: format!("failed to flush stdin: {e}"),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> InboundFrame {
        serde_json::from_value(serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}}))
            .unwrap()
    }

    #[test]
    fn test_merged_environment_overrides_win() {
        std::env::set_var("__MCP_BRIDGE_TRANSPORT_TEST__", "base");
        let mut overrides = HashMap::new();
        overrides.insert("__MCP_BRIDGE_TRANSPORT_TEST__".to_string(), "override".to_string());
        overrides.insert("__MCP_BRIDGE_EXTRA__".to_string(), "extra".to_string());

        let env = merged_environment(&overrides);
        assert_eq!(
            env.get(&OsString::from("__MCP_BRIDGE_TRANSPORT_TEST__")),
            Some(&OsString::from("override"))
        );
        assert_eq!(
            env.get(&OsString::from("__MCP_BRIDGE_EXTRA__")),
            Some(&OsString::from("extra"))
        );
        assert!(env.len() > overrides.len(), "process environment should be kept");
        std::env::remove_var("__MCP_BRIDGE_TRANSPORT_TEST__");
    }

    #[tokio::test]
    async fn test_pending_table_resolves_by_id_out_of_order() {
        let mut table = PendingTable::default();
        let rx1 = table.register(1).unwrap();
        let rx2 = table.register(2).unwrap();

        assert!(table.resolve(2, frame(2)));
        assert!(table.resolve(1, frame(1)));
        assert!(!table.resolve(3, frame(3)));

        assert_eq!(rx1.await.unwrap().unwrap().kind(), FrameKind::Response(1));
        assert_eq!(rx2.await.unwrap().unwrap().kind(), FrameKind::Response(2));
        assert!(table.waiters.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_fails_every_waiter_and_refuses_new_ones() {
        let mut table = PendingTable::default();
        let receivers: Vec<_> = (1..=3).map(|id| table.register(id).unwrap()).collect();

        assert_eq!(table.fail_all("server stdout closed"), 3);
        assert!(table.waiters.is_empty());

        for rx in receivers {
            let err = rx.await.unwrap().unwrap_err();
            assert!(matches!(err, McpError::TransportLost { .. }));
        }
        assert!(matches!(
            table.register(4),
            Err(McpError::TransportLost { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_peer_exit_fails_outstanding_requests() {
        // Reads one line and exits without answering.
        let args = vec!["-c".to_string(), "read line; exit 0".to_string()];
        let transport =
            StdioTransport::open("sh", &args, &HashMap::new(), TransportOptions::default())
                .unwrap();

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::TransportLost { .. }), "got {err:?}");
        transport.closed().await;
        assert!(transport.is_closed());
        assert_eq!(transport.pending_count(), 0);
        transport.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_for_missing_binary() {
        let result = StdioTransport::open(
            "/nonexistent/mcp-server-binary",
            &[],
            &HashMap::new(),
            TransportOptions::default(),
        );
        assert!(matches!(result, Err(McpError::SpawnFailure { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_times_out_and_clears_pending() {
        // Consumes input forever without replying.
        let args = vec!["-c".to_string(), "cat > /dev/null".to_string()];
        let options = TransportOptions {
            request_timeout: Some(Duration::from_millis(100)),
            shutdown_timeout: Duration::from_secs(2),
            ..TransportOptions::default()
        };
        let transport = StdioTransport::open("sh", &args, &HashMap::new(), options).unwrap();

        let err = transport.request("ping", None).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert_eq!(transport.pending_count(), 0);

        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert_eq!(transport.pending_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_oversized_frame_is_dropped_and_channel_survives() {
        // One 200-byte line, then a valid reply to the first request.
        let script = r#"read line
head -c 200 /dev/zero | tr '\0' 'x'
printf '\n{"jsonrpc":"2.0","id":1,"result":{"ok":true}}\n'
cat > /dev/null"#;
        let args = vec!["-c".to_string(), script.to_string()];
        let options = TransportOptions {
            max_frame_bytes: 64,
            ..TransportOptions::default()
        };
        let transport = StdioTransport::open("sh", &args, &HashMap::new(), options).unwrap();

        let result = transport.request("ping", None).await.unwrap();
        assert_eq!(result["ok"], true);
        assert!(!transport.is_closed());
        transport.close().await;
    }
}
