//! Host configuration
//!
//! `HostConfig` carries the fixed helper endpoint and the lifecycle timings.
//! `Settings` holds the read-only interpreter keys consumed from user and
//! workspace settings files (the JSON layout editors use, e.g.
//! `{"python.defaultInterpreterPath": "/opt/py/bin/python"}`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HostError, Result};

/// Name of the directory used under the OS config dir for user settings
pub const APP_DIR_NAME: &str = "matlab-troubleshooter";

/// Configuration for the host controller and supervisor
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Loopback host the helper listens on
    pub helper_host: String,
    /// Fixed helper port
    pub helper_port: u16,
    /// Number of `/health` polls after a spawn before giving up
    pub startup_poll_attempts: u32,
    /// Spacing between `/health` polls
    pub startup_poll_interval: Duration,
    /// Timeout for a single liveness probe
    pub probe_timeout: Duration,
    /// Grace delay after triggering a respawn before replying with an error
    pub respawn_grace: Duration,
    /// Deadline for a forwarded troubleshoot request
    pub request_timeout: Duration,
    /// Root directory of the installed extension (holds `src/`, `server/`)
    pub extension_dir: PathBuf,
    /// Extra directories searched for the helper program, after the defaults
    pub extra_program_dirs: Vec<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            helper_host: "127.0.0.1".to_string(),
            helper_port: 5000,
            startup_poll_attempts: 10,
            startup_poll_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            respawn_grace: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
            extension_dir: PathBuf::from("."),
            extra_program_dirs: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Base URL of the helper, e.g. `http://127.0.0.1:5000`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.helper_host, self.helper_port)
    }
}

/// Interpreter keys read from a single settings file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(rename = "python.defaultInterpreterPath", default)]
    pub default_interpreter_path: Option<PathBuf>,
    #[serde(rename = "python.pythonPath", default)]
    pub python_path: Option<PathBuf>,
}

impl Settings {
    /// Read one settings file. A missing file yields empty settings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(HostError::io(path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&text).map_err(|e| HostError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load user settings, then overlay workspace settings key by key
    pub fn load(user: Option<&Path>, workspace: Option<&Path>) -> Result<Self> {
        let mut merged = match user {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(path) = workspace {
            let ws = Self::from_file(path)?;
            if ws.default_interpreter_path.is_some() {
                merged.default_interpreter_path = ws.default_interpreter_path;
            }
            if ws.python_path.is_some() {
                merged.python_path = ws.python_path;
            }
        }
        Ok(merged)
    }

    /// Configured interpreter paths in lookup order
    pub fn interpreter_candidates(&self) -> Vec<PathBuf> {
        self.default_interpreter_path
            .iter()
            .chain(self.python_path.iter())
            .filter(|p| !p.as_os_str().is_empty())
            .cloned()
            .collect()
    }

    /// `<config dir>/matlab-troubleshooter/settings.json`
    pub fn user_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// `<workspace>/.vscode/settings.json`
    pub fn workspace_settings_path(workspace: &Path) -> PathBuf {
        workspace.join(".vscode").join("settings.json")
    }
}
