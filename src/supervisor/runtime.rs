//! Interpreter discovery
//!
//! Sources are consulted strictly in order and lazily: once a candidate
//! turns out to be an existing, executable file, no further candidate is
//! produced, so later PATH lookups and later sources never run.
//!
//! ```text
//! InterpreterApiSource ──► SettingsSource ──► WellKnownSource
//!   (active/picked)         (config keys)       (fixed paths, PATH lookup)
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::config::Settings;

/// A place interpreters can be discovered from
pub trait RuntimeSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Candidate paths in preference order; may not exist
    fn candidates(&self) -> Box<dyn Iterator<Item = PathBuf> + '_>;
}

/// Integration API of an installed interpreter manager
pub trait InterpreterProvider: Send + Sync {
    /// Currently active interpreter, if the provider knows one
    fn active_interpreter(&self) -> Option<PathBuf>;

    /// Record an interpreter the user picked interactively
    fn select(&self, path: PathBuf);
}

/// Result of a successful discovery
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeMatch {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Ordered list of runtime sources
pub struct RuntimeLocator {
    sources: Vec<Box<dyn RuntimeSource>>,
}

impl RuntimeLocator {
    pub fn new(sources: Vec<Box<dyn RuntimeSource>>) -> Self {
        Self { sources }
    }

    /// The standard order: provider API, settings keys, well-known locations
    pub fn standard(provider: Arc<dyn InterpreterProvider>, settings: Settings) -> Self {
        Self::new(vec![
            Box::new(InterpreterApiSource::new(provider)),
            Box::new(SettingsSource::new(settings)),
            Box::new(WellKnownSource::default()),
        ])
    }

    /// First existing, executable candidate across all sources
    pub fn locate(&self) -> Option<RuntimeMatch> {
        for source in &self.sources {
            for candidate in source.candidates() {
                if is_executable_file(&candidate) {
                    info!(path = %candidate.display(), source = source.name(), "Found interpreter");
                    return Some(RuntimeMatch {
                        path: candidate,
                        source: source.name(),
                    });
                }
                debug!(path = %candidate.display(), source = source.name(), "Interpreter candidate rejected");
            }
        }
        None
    }
}

/// Source backed by an [`InterpreterProvider`]
pub struct InterpreterApiSource {
    provider: Arc<dyn InterpreterProvider>,
}

impl InterpreterApiSource {
    pub fn new(provider: Arc<dyn InterpreterProvider>) -> Self {
        Self { provider }
    }
}

impl RuntimeSource for InterpreterApiSource {
    fn name(&self) -> &'static str {
        "interpreter_api"
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        Box::new(self.provider.active_interpreter().into_iter())
    }
}

/// Source backed by `python.defaultInterpreterPath` / `python.pythonPath`
pub struct SettingsSource {
    settings: Settings,
}

impl SettingsSource {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl RuntimeSource for SettingsSource {
    fn name(&self) -> &'static str {
        "settings"
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        Box::new(self.settings.interpreter_candidates().into_iter())
    }
}

/// Fixed filesystem paths, then bare command names resolved through PATH
pub struct WellKnownSource {
    paths: Vec<PathBuf>,
    commands: Vec<String>,
}

impl Default for WellKnownSource {
    fn default() -> Self {
        Self {
            paths: [
                "/usr/bin/python3",
                "/usr/local/bin/python3",
                "/usr/bin/python",
                r"C:\Python39\python.exe",
                r"C:\Python310\python.exe",
                r"C:\Python311\python.exe",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            commands: vec!["python3".to_string(), "python".to_string()],
        }
    }
}

impl WellKnownSource {
    pub fn new(paths: Vec<PathBuf>, commands: Vec<String>) -> Self {
        Self { paths, commands }
    }
}

impl RuntimeSource for WellKnownSource {
    fn name(&self) -> &'static str {
        "well_known"
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        let resolved = self
            .commands
            .iter()
            .filter_map(|cmd| which::which(cmd).ok());
        Box::new(self.paths.iter().cloned().chain(resolved))
    }
}

/// Default provider: an interactively picked interpreter, then the active
/// virtualenv or conda environment
#[derive(Default)]
pub struct EnvInterpreterProvider {
    selected: RwLock<Option<PathBuf>>,
}

impl EnvInterpreterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_env_prefix(var: &str) -> Option<PathBuf> {
        let prefix = std::env::var_os(var)?;
        let prefix = PathBuf::from(prefix);
        let unix = prefix.join("bin").join("python");
        if unix.exists() {
            return Some(unix);
        }
        let windows = prefix.join("Scripts").join("python.exe");
        if windows.exists() {
            return Some(windows);
        }
        Some(prefix.join("python.exe"))
    }
}

impl InterpreterProvider for EnvInterpreterProvider {
    fn active_interpreter(&self) -> Option<PathBuf> {
        let picked = self
            .selected
            .read()
            .ok()
            .and_then(|guard| guard.clone());
        picked
            .or_else(|| Self::from_env_prefix("VIRTUAL_ENV"))
            .or_else(|| Self::from_env_prefix("CONDA_PREFIX"))
    }

    fn select(&self, path: PathBuf) {
        if let Ok(mut guard) = self.selected.write() {
            *guard = Some(path);
        }
    }
}

/// True for an existing regular file the current user may execute
pub fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
