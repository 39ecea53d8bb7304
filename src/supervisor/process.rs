//! Helper process handle
//!
//! Tracks one spawned helper: `<runtime> <program>` running in the program's
//! directory with stdin closed. Output is streamed line by line into the log
//! instead of being buffered.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::error::{HostError, Result};

/// Environment variable carrying the host the helper must bind
pub const HELPER_HOST_ENV: &str = "MATLAB_TROUBLESHOOTER_HOST";
/// Environment variable carrying the port the helper must listen on
pub const HELPER_PORT_ENV: &str = "MATLAB_TROUBLESHOOTER_PORT";

/// A spawned helper process
pub struct HelperProcess {
    child: Child,
    pid: Option<u32>,
    runtime: PathBuf,
    program: PathBuf,
    exit_code: Option<i32>,
    exited: bool,
    exit_reported: bool,
    started_at: Instant,
}

impl HelperProcess {
    /// Spawn `<runtime> <program>` with cwd = the program's directory
    pub fn spawn(runtime: &Path, program: &Path) -> Result<Self> {
        Self::spawn_with_env(runtime, program, &[])
    }

    /// Like [`HelperProcess::spawn`], with extra environment variables for the child
    pub fn spawn_with_env(runtime: &Path, program: &Path, envs: &[(&str, String)]) -> Result<Self> {
        let cwd = program.parent().unwrap_or_else(|| Path::new("."));

        info!(runtime = %runtime.display(), program = %program.display(), "Starting helper process");

        let mut child = Command::new(runtime)
            .arg(program)
            .envs(envs.iter().map(|(key, value)| (*key, value.as_str())))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HostError::SpawnError {
                runtime: runtime.to_path_buf(),
                program: program.to_path_buf(),
                source,
            })?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, pid, Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, pid, Stream::Stderr));
        }

        Ok(Self {
            child,
            pid,
            runtime: runtime.to_path_buf(),
            program: program.to_path_buf(),
            exit_code: None,
            exited: false,
            exit_reported: false,
            started_at: Instant::now(),
        })
    }

    /// Liveness flag; records the exit code the first time an exit is seen
    pub fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exited = true;
                self.exit_code = status.code();
                match status.code() {
                    Some(0) => info!(pid = ?self.pid, "Helper process exited with code 0"),
                    Some(code) => error!(pid = ?self.pid, code, "Helper process exited with code {}", code),
                    None => warn!(pid = ?self.pid, "Helper process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "Failed to poll helper process");
                false
            }
        }
    }

    /// Exit code once the process has been observed to exit
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Report an exit the first time it is observed
    ///
    /// Returns `Some(code)` exactly once for a process that exited on its own;
    /// `code` is `None` when a signal ended it. A killed process never reports.
    pub fn take_exit(&mut self) -> Option<Option<i32>> {
        if self.exit_reported || self.is_alive() {
            return None;
        }
        self.exit_reported = true;
        Some(self.exit_code)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Time since spawn
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Force-terminate the process and reap it; there is no shutdown handshake
    pub async fn kill(&mut self) {
        if self.exited {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!(pid = ?self.pid, error = %e, "Failed to kill helper process");
        }
        self.exited = true;
        self.exit_reported = true;
        info!(pid = ?self.pid, "Helper process stopped");
    }
}

impl std::fmt::Debug for HelperProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperProcess")
            .field("pid", &self.pid)
            .field("runtime", &self.runtime)
            .field("program", &self.program)
            .field("exit_code", &self.exit_code)
            .field("age", &self.age())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(reader: R, pid: Option<u32>, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                match stream {
                    Stream::Stdout => info!(target: "helper", pid = ?pid, "{}", line),
                    Stream::Stderr => warn!(target: "helper", pid = ?pid, "{}", line),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: "helper", pid = ?pid, error = %e, "Helper output stream failed");
                break;
            }
        }
    }
}
