//! Bridge configuration.
//!
//! A YAML file with four optional sections (`server`, `gateway`, `model`,
//! `log`). Every field has a default, so running without a file works.
//! `${VAR}` and `${VAR:-default}` are interpolated over the raw text before
//! parsing.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::inference::{ModelConfig, ModelProvider};
use crate::mcp_client::transport::TransportOptions;
use crate::mcp_client::SessionOptions;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Env var naming the config file.
pub const CONFIG_ENV_VAR: &str = "MCP_BRIDGE_CONFIG";

/// Looked up in the working directory when nothing else names a file.
pub const DEFAULT_CONFIG_FILE: &str = "mcp-bridge.yaml";

pub const DEFAULT_BIND: &str = "127.0.0.1:3002";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Sections ────────────────────────────────────────────────────────────────

/// Root of `mcp-bridge.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub model: ModelConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// MCP session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: String,
    /// `0` disables the per-request timeout.
    pub request_timeout_secs: u64,
    pub init_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let session = SessionOptions::default();
        let transport = session.transport;
        Self {
            client_name: session.client_name,
            client_version: session.client_version,
            protocol_version: session.protocol_version,
            request_timeout_secs: transport.request_timeout.map_or(0, |d| d.as_secs()),
            init_timeout_secs: session.init_timeout.as_secs(),
            shutdown_timeout_secs: transport.shutdown_timeout.as_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            client_name: self.client_name.clone(),
            client_version: self.client_version.clone(),
            protocol_version: self.protocol_version.clone(),
            init_timeout: Duration::from_secs(self.init_timeout_secs),
            transport: TransportOptions {
                request_timeout: (self.request_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.request_timeout_secs)),
                shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
                ..TransportOptions::default()
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: Option<String>,
    /// Also write `bridge.log` in the data directory.
    pub file: bool,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: None,
            file: true,
            json: false,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Pick the config file: `explicit`, then `$MCP_BRIDGE_CONFIG`, then
/// `./mcp-bridge.yaml` if it exists. `None` means run on defaults.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_config_path(explicit, std::env::var_os(CONFIG_ENV_VAR), &cwd)
}

fn resolve_config_path(
    explicit: Option<&Path>,
    from_env: Option<OsString>,
    cwd: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let candidate = cwd.join(DEFAULT_CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

impl BridgeConfig {
    /// Load `path` (or defaults when `None`), fill the API key from the
    /// provider's env var if unset, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Self::from_yaml_str(&raw)?
            }
            None => Self::default(),
        };

        if config.model.api_key.is_empty() {
            if let Ok(key) = std::env::var(api_key_env_var(config.model.provider)) {
                config.model.api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text after env-var interpolation. Blank text gives defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.model.validate().map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        if self.gateway.init_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "gateway.init_timeout_secs must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Invalid {
                reason: format!("server.bind '{}' is not a socket address: {e}", self.server.bind),
            })
    }
}

/// Env var consulted when `model.api_key` is empty.
fn api_key_env_var(provider: ModelProvider) -> &'static str {
    match provider {
        ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
        ModelProvider::Openai => "OPENAI_API_KEY",
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset and empty both take the default.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
