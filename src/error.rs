//! Error taxonomy for the host side
//!
//! Every variant is recoverable from the host's point of view: the panel
//! stays usable and the next user action retries through `ensure_ready`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

/// Errors surfaced by the supervisor, the controller and the bridge
#[derive(Debug, Error)]
pub enum HostError {
    /// No interpreter could be discovered, even after an interactive pick
    #[error("Python interpreter is required but not found")]
    RuntimeNotFound,

    /// The helper process could not be started
    #[error("failed to start helper process {runtime} {program}: {source}")]
    SpawnError {
        runtime: PathBuf,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The health probe never answered within the polling budget
    #[error("helper did not answer /health after {attempts} attempts ({interval:?} apart)")]
    StartupTimeout { attempts: u32, interval: Duration },

    /// The helper process exited before it answered `/health`
    #[error("helper process exited with {}", describe_exit(.code))]
    HelperExited { code: Option<i32> },

    /// A forwarded request failed
    #[error("upstream request failed: {0}")]
    UpstreamError(String),

    /// The request was cancelled because the panel closed
    #[error("request cancelled")]
    Cancelled,

    /// Settings could not be read or parsed
    #[error("invalid settings in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Filesystem failure while materializing the helper program
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::RuntimeNotFound => "runtime_not_found",
            HostError::SpawnError { .. } => "spawn_error",
            HostError::StartupTimeout { .. } => "startup_timeout",
            HostError::HelperExited { .. } => "helper_exited",
            HostError::UpstreamError(_) => "upstream_error",
            HostError::Cancelled => "cancelled",
            HostError::Config { .. } => "config",
            HostError::Io { .. } => "io",
        }
    }
}

/// `code 3`, or `a signal` when the process was killed by one
pub fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}
