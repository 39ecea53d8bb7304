//! Helper program discovery and default-collaborator install
//!
//! The helper program is looked up by file name in a fixed, ordered list of
//! directories. When none has it, the default program and its companion
//! module are written to the install directory. The payload is fixed (see
//! `assets/helper/`); nothing is templated.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{HostError, Result};

/// File name the helper program is looked up by
pub const ADAPTER_FILE: &str = "api_adapter.py";
/// Companion module imported by the default program
pub const COMPANION_FILE: &str = "query_processor.py";

const ADAPTER_PAYLOAD: &str = include_str!("../../assets/helper/api_adapter.py");
const COMPANION_PAYLOAD: &str = include_str!("../../assets/helper/query_processor.py");

/// How the program path was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOrigin {
    Found,
    Materialized,
}

/// Resolved helper program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramLocation {
    pub path: PathBuf,
    pub origin: ProgramOrigin,
}

impl ProgramLocation {
    /// Directory the helper runs in
    pub fn working_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Ordered program search plus the fallback install directory
#[derive(Debug, Clone)]
pub struct ProgramLocator {
    search_dirs: Vec<PathBuf>,
    install_dir: PathBuf,
}

impl ProgramLocator {
    pub fn new(search_dirs: Vec<PathBuf>, install_dir: PathBuf) -> Self {
        Self {
            search_dirs,
            install_dir,
        }
    }

    /// Standard layout relative to the extension root:
    /// `src/`, `server/`, `../AI-Troubleshooting-Agent/`, then `extra`.
    /// Installs into `server/`.
    pub fn for_extension(extension_dir: &Path, extra: &[PathBuf]) -> Self {
        let mut search_dirs = vec![
            extension_dir.join("src"),
            extension_dir.join("server"),
            extension_dir.join("..").join("AI-Troubleshooting-Agent"),
        ];
        search_dirs.extend(extra.iter().cloned());
        Self::new(search_dirs, extension_dir.join("server"))
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First directory holding the adapter file
    pub fn find(&self) -> Option<PathBuf> {
        self.search_dirs.iter().find_map(|dir| {
            let candidate = dir.join(ADAPTER_FILE);
            debug!(path = %candidate.display(), "Checking helper program path");
            candidate.is_file().then_some(candidate)
        })
    }

    /// Found program, or the freshly installed default one
    pub fn locate_or_materialize(&self) -> Result<ProgramLocation> {
        if let Some(path) = self.find() {
            info!(path = %path.display(), "Found helper program");
            return Ok(ProgramLocation {
                path,
                origin: ProgramOrigin::Found,
            });
        }
        let path = install_default_program(&self.install_dir)?;
        Ok(ProgramLocation {
            path,
            origin: ProgramOrigin::Materialized,
        })
    }
}

/// Write the default program and its companion into `dir`
///
/// An adapter already present in `dir` is left untouched.
pub fn install_default_program(dir: &Path) -> Result<PathBuf> {
    let adapter = dir.join(ADAPTER_FILE);
    if adapter.is_file() {
        return Ok(adapter);
    }

    std::fs::create_dir_all(dir).map_err(|e| HostError::io(dir, e))?;
    std::fs::write(&adapter, ADAPTER_PAYLOAD).map_err(|e| HostError::io(&adapter, e))?;
    let companion = dir.join(COMPANION_FILE);
    std::fs::write(&companion, COMPANION_PAYLOAD).map_err(|e| HostError::io(&companion, e))?;

    info!(path = %adapter.display(), "Installed default helper program");
    Ok(adapter)
}
