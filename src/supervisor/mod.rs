//! Helper process supervisor
//!
//! This module finds everything needed to run the helper and starts it:
//! - Interpreter discovery (provider API, settings keys, well-known paths)
//! - Helper program discovery, or install of the default program
//! - Spawning with streamed output and liveness reporting

pub mod process;
pub mod program;
pub mod runtime;

pub use process::{HelperProcess, HELPER_HOST_ENV, HELPER_PORT_ENV};
pub use program::{ProgramLocation, ProgramLocator, ProgramOrigin};
pub use runtime::{EnvInterpreterProvider, InterpreterProvider, RuntimeLocator, RuntimeSource};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{HostConfig, Settings};
use crate::error::{HostError, Result};

/// Asks the user to choose an interpreter when discovery comes up empty
#[async_trait]
pub trait InterpreterPicker: Send + Sync {
    async fn pick_interpreter(&self) -> Option<PathBuf>;
}

/// Picker that never offers a choice
pub struct NoPicker;

#[async_trait]
impl InterpreterPicker for NoPicker {
    async fn pick_interpreter(&self) -> Option<PathBuf> {
        None
    }
}

/// Starts a fresh helper process
///
/// The controller only depends on this trait, so tests can stand in a
/// process of their own.
#[async_trait]
pub trait HelperLauncher: Send + Sync {
    async fn launch(&self) -> Result<HelperProcess>;
}

/// Discovery plus spawn for the real helper
pub struct Supervisor {
    runtimes: RuntimeLocator,
    provider: Arc<dyn InterpreterProvider>,
    programs: ProgramLocator,
    picker: Arc<dyn InterpreterPicker>,
    helper_host: String,
    helper_port: u16,
}

impl Supervisor {
    pub fn new(
        runtimes: RuntimeLocator,
        provider: Arc<dyn InterpreterProvider>,
        programs: ProgramLocator,
        picker: Arc<dyn InterpreterPicker>,
    ) -> Self {
        let defaults = HostConfig::default();
        Self {
            runtimes,
            provider,
            programs,
            picker,
            helper_host: defaults.helper_host,
            helper_port: defaults.helper_port,
        }
    }

    /// Endpoint handed to the helper through its environment
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.helper_host = host.into();
        self.helper_port = port;
        self
    }

    /// Standard discovery layout for the given config and settings
    pub fn from_config(
        config: &HostConfig,
        settings: Settings,
        provider: Arc<dyn InterpreterProvider>,
        picker: Arc<dyn InterpreterPicker>,
    ) -> Self {
        let runtimes = RuntimeLocator::standard(provider.clone(), settings);
        let programs =
            ProgramLocator::for_extension(&config.extension_dir, &config.extra_program_dirs);
        Self::new(runtimes, provider, programs, picker)
            .with_endpoint(config.helper_host.clone(), config.helper_port)
    }

    /// Discover an interpreter, asking the picker once if nothing is found
    pub async fn locate_runtime(&self) -> Result<PathBuf> {
        if let Some(found) = self.runtimes.locate() {
            return Ok(found.path);
        }

        warn!("No Python interpreter found, requesting a selection");
        let Some(picked) = self.picker.pick_interpreter().await else {
            return Err(HostError::RuntimeNotFound);
        };
        self.provider.select(picked);

        self.runtimes
            .locate()
            .map(|found| found.path)
            .ok_or(HostError::RuntimeNotFound)
    }

    pub fn locate_or_materialize_program(&self) -> Result<ProgramLocation> {
        self.programs.locate_or_materialize()
    }

    /// Spawn the helper, telling it which host and port to serve on
    pub fn spawn(&self, runtime: &Path, program: &Path) -> Result<HelperProcess> {
        HelperProcess::spawn_with_env(
            runtime,
            program,
            &[
                (HELPER_HOST_ENV, self.helper_host.clone()),
                (HELPER_PORT_ENV, self.helper_port.to_string()),
            ],
        )
    }
}

#[async_trait]
impl HelperLauncher for Supervisor {
    async fn launch(&self) -> Result<HelperProcess> {
        let runtime = self.locate_runtime().await?;
        let program = self.locate_or_materialize_program()?;
        let process = self.spawn(&runtime, &program.path)?;
        info!(
            pid = ?process.pid(),
            runtime = %runtime.display(),
            program = %program.path.display(),
            origin = ?program.origin,
            "Helper process launched"
        );
        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        selected: Mutex<Option<PathBuf>>,
    }

    impl InterpreterProvider for RecordingProvider {
        fn active_interpreter(&self) -> Option<PathBuf> {
            self.selected.lock().unwrap().clone()
        }

        fn select(&self, path: PathBuf) {
            *self.selected.lock().unwrap() = Some(path);
        }
    }

    struct FixedPicker {
        choice: Option<PathBuf>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InterpreterPicker for FixedPicker {
        async fn pick_interpreter(&self) -> Option<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.choice.clone()
        }
    }

    fn supervisor(
        provider: Arc<RecordingProvider>,
        picker: Arc<FixedPicker>,
        ext: &Path,
    ) -> Supervisor {
        let runtimes = RuntimeLocator::new(vec![Box::new(runtime::InterpreterApiSource::new(
            provider.clone(),
        ))]);
        Supervisor::new(
            runtimes,
            provider,
            ProgramLocator::for_extension(ext, &[]),
            picker,
        )
    }

    #[tokio::test]
    async fn test_runtime_not_found_without_pick() {
        let dir = tempfile::tempdir().unwrap();
        let picker = Arc::new(FixedPicker {
            choice: None,
            calls: AtomicUsize::new(0),
        });
        let sup = supervisor(Arc::new(RecordingProvider::default()), picker.clone(), dir.path());

        let err = sup.locate_runtime().await.unwrap_err();
        assert!(matches!(err, HostError::RuntimeNotFound));
        assert_eq!(picker.calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pick_is_retried_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let python = dir.path().join("python3");
        std::fs::write(&python, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let picker = Arc::new(FixedPicker {
            choice: Some(python.clone()),
            calls: AtomicUsize::new(0),
        });
        let sup = supervisor(Arc::new(RecordingProvider::default()), picker.clone(), dir.path());

        assert_eq!(sup.locate_runtime().await.unwrap(), python);
        assert_eq!(picker.calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_passes_configured_port() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("endpoint.txt");
        let program = dir.path().join("helper.sh");
        std::fs::write(
            &program,
            format!("echo \"${}:${}\" > '{}'\n", HELPER_HOST_ENV, HELPER_PORT_ENV, out.display()),
        )
        .unwrap();

        let config = HostConfig {
            helper_port: 5077,
            extension_dir: dir.path().to_path_buf(),
            ..HostConfig::default()
        };
        let picker = Arc::new(FixedPicker {
            choice: None,
            calls: AtomicUsize::new(0),
        });
        let sup = Supervisor::from_config(
            &config,
            Settings::default(),
            Arc::new(RecordingProvider::default()),
            picker,
        );

        let mut process = sup.spawn(Path::new("/bin/sh"), &program).unwrap();
        for _ in 0..50 {
            if !process.is_alive() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "127.0.0.1:5077");
    }

    #[tokio::test]
    async fn test_picked_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let picker = Arc::new(FixedPicker {
            choice: Some(dir.path().join("not-there")),
            calls: AtomicUsize::new(0),
        });
        let sup = supervisor(Arc::new(RecordingProvider::default()), picker, dir.path());

        assert!(matches!(
            sup.locate_runtime().await,
            Err(HostError::RuntimeNotFound)
        ));
    }
}
