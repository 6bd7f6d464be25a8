//! Bridge settings: the saved server launch command.
//!
//! Persisted to `settings.json` in the data directory. Writes go to a temp
//! file first and are renamed into place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::mcp_client::ServerLaunch;

use super::{success, ApiResult, SharedContext};

// ─── BridgeSettings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BridgeSettings {
    pub server_command: String,
    pub server_args: Vec<String>,
    pub environment_variables: HashMap<String, String>,
    /// Connect with the saved command when `serve` starts.
    pub auto_connect: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            server_command: "node".to_string(),
            server_args: vec!["../../build/mcp.js".to_string()],
            environment_variables: HashMap::new(),
            auto_connect: false,
        }
    }
}

impl BridgeSettings {
    pub fn launch(&self) -> ServerLaunch {
        ServerLaunch {
            command: self.server_command.clone(),
            args: self.server_args.clone(),
            environment_variables: self.environment_variables.clone(),
        }
    }

    /// Load from disk or return defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(settings) => {
                    tracing::info!(path = %path.display(), "loaded bridge settings");
                    settings
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse bridge settings, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to read bridge settings, using defaults");
                Self::default()
            }
        }
    }

    /// Save to disk (atomic write).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, path)?;
        tracing::debug!(path = %path.display(), "saved bridge settings");
        Ok(())
    }
}

// ─── SettingsStore ──────────────────────────────────────────────────────────

/// In-memory settings backed by a file.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<BridgeSettings>,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> Self {
        let current = BridgeSettings::load_or_default(&path);
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> BridgeSettings {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Persist first; memory only changes if the write succeeded.
    pub fn replace(&self, settings: BridgeSettings) -> std::io::Result<()> {
        settings.save(&self.path)?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
        Ok(())
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: BridgeSettings,
}

/// `GET /api/settings`
pub async fn get_settings(State(ctx): State<SharedContext>) -> ApiResult<SettingsResponse> {
    Ok(success(SettingsResponse {
        settings: ctx.settings.get(),
    }))
}

/// `PUT /api/settings`: replace the whole record.
pub async fn update_settings(
    State(ctx): State<SharedContext>,
    payload: Result<Json<BridgeSettings>, JsonRejection>,
) -> ApiResult<SettingsResponse> {
    let Json(settings) = payload?;
    ctx.settings.replace(settings.clone())?;
    tracing::info!(
        command = %settings.server_command,
        auto_connect = settings.auto_connect,
        "bridge settings updated"
    );
    Ok(success(SettingsResponse { settings }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
