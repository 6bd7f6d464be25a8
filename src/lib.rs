pub mod agent_core;
pub mod commands;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use agent_core::{Orchestrator, ToolRouter};
use commands::settings::SettingsStore;
use config::{BridgeConfig, LogConfig};
use inference::{LanguageModel, ModelClient};
use mcp_client::SessionGateway;

/// Default `EnvFilter` directives when neither `RUST_LOG` nor `log.filter` is set.
const DEFAULT_LOG_FILTER: &str = "mcp_bridge=info,warn";

/// Rotated log files kept next to `bridge.log`.
const LOG_FILES_KEPT: u32 = 3;

// ─── Application State ──────────────────────────────────────────────────────

/// Everything the HTTP handlers share.
pub struct AppContext {
    pub gateway: Arc<SessionGateway>,
    pub orchestrator: Orchestrator,
    pub settings: SettingsStore,
}

impl AppContext {
    /// Wire the orchestrator to the gateway through a `ToolRouter`.
    pub fn new(
        gateway: Arc<SessionGateway>,
        model: Arc<dyn LanguageModel>,
        settings: SettingsStore,
    ) -> Self {
        let tools = Arc::new(ToolRouter::new(Arc::clone(&gateway)));
        Self {
            orchestrator: Orchestrator::new(model, tools),
            gateway,
            settings,
        }
    }
}

/// Return the platform-standard data directory for the bridge.
///
/// - macOS: `~/Library/Application Support/mcp-bridge/`
/// - Windows: `{FOLDERID_RoamingAppData}\mcp-bridge\`
/// - Linux: `$XDG_DATA_HOME/mcp-bridge/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mcp-bridge/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-bridge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-bridge")
}

// ─── Logging ────────────────────────────────────────────────────────────────

fn env_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or(DEFAULT_LOG_FILTER)))
}

/// Initialize tracing for `serve`: stderr plus, when enabled, `bridge.log`.
///
/// On each start the previous logs are rotated (bridge.log → .1 → .2 → .3)
/// and a fresh `bridge.log` is opened with a line-flushing writer. Returns
/// the log file path when one is written.
pub fn init_tracing(log: &LogConfig, log_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    let filter = env_filter(log.filter.as_deref());

    let log_file = if log.file {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create {}", log_dir.display()))?;
        let log_path = log_dir.join("bridge.log");
        rotate_log_file(&log_path, LOG_FILES_KEPT);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open {}", log_path.display()))?;
        Some((log_path, FlushingWriter::new(file)))
    } else {
        None
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let path = match (log_file, log.json) {
        (Some((path, file)), true) => {
            builder
                .json()
                .with_writer(std::io::stderr.and(file))
                .try_init()
                .map_err(subscriber_error)?;
            Some(path)
        }
        (Some((path, file)), false) => {
            builder
                .with_writer(std::io::stderr.and(file))
                .try_init()
                .map_err(subscriber_error)?;
            Some(path)
        }
        (None, true) => {
            builder
                .json()
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(subscriber_error)?;
            None
        }
        (None, false) => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(subscriber_error)?;
            None
        }
    };
    Ok(path)
}

fn subscriber_error(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("failed to initialize tracing: {e}")
}

/// Quiet stderr-only logging for the remote-client subcommands.
pub fn init_client_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(Some("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Rotate log files: `bridge.log` → `bridge.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Each log line is on disk as soon as it is written, so a killed bridge
/// leaves a complete log behind.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Server ─────────────────────────────────────────────────────────────────

/// Run the HTTP façade until Ctrl-C, then disconnect the session.
pub async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let data_dir = data_dir();

    let log_path = init_tracing(&config.log, &data_dir)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir.display(),
        log_file = ?log_path,
        pid = std::process::id(),
        "=== mcp-bridge starting ==="
    );

    let model = ModelClient::from_config(config.model.clone())
        .context("failed to build model client")?;
    tracing::info!(
        provider = ?config.model.provider,
        model = %config.model.model,
        api_key_set = !config.model.api_key.is_empty(),
        "model client ready"
    );

    let gateway = Arc::new(SessionGateway::new(config.gateway.session_options()));
    let settings = SettingsStore::open(data_dir.join("settings.json"));
    let ctx = Arc::new(AppContext::new(
        Arc::clone(&gateway),
        Arc::new(model),
        settings,
    ));

    auto_connect(&ctx).await;

    let app = commands::router(Arc::clone(&ctx));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(url = %format!("http://{addr}"), "bridge server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(disconnect_after(termination_signal(), Arc::clone(&gateway)))
        .await
        .context("HTTP server failed")?;

    // No-op after a signal; covers the server failing on its own.
    gateway.disconnect().await;
    tracing::info!("bridge stopped");
    Ok(())
}

/// Connect with the saved launch command when `autoConnect` is set.
/// Failure leaves the gateway idle.
async fn auto_connect(ctx: &AppContext) {
    let settings = ctx.settings.get();
    if !settings.auto_connect {
        return;
    }
    let launch = settings.launch();
    match ctx.gateway.connect(&launch).await {
        Ok(summary) => tracing::info!(
            server = %summary.server_info.name,
            tools = summary.tools.len(),
            "auto-connected to MCP server"
        ),
        Err(e) => tracing::warn!(
            command = %launch.command,
            error = %e,
            "auto-connect failed, staying idle"
        ),
    }
}

/// Wait for `signal`, then disconnect before the HTTP drain starts.
///
/// Requests blocked on the peer fail with `TransportLost` and answer, so
/// graceful shutdown does not wait on them.
async fn disconnect_after(
    signal: impl std::future::Future<Output = ()>,
    gateway: Arc<SessionGateway>,
) {
    signal.await;
    tracing::info!("shutting down, disconnecting MCP session");
    gateway.disconnect().await;
}

/// Ctrl-C, or SIGTERM on unix.
async fn termination_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("interrupt received"),
        _ = terminate => tracing::info!("terminate received"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
