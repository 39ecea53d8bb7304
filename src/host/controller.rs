//! Host controller
//!
//! Owns the single helper process of one panel and the lifecycle around it:
//!
//! ```text
//!   Idle ──ensure_ready──► Starting ──probe ok──► Healthy
//!                             │                     │ transport failure
//!                      spawn/poll failed            ▼
//!                             └────────────────► Failed ──dead handle──► Restarting
//!                                                   ▲                        │
//!                                                   └──── launch failed ─────┘
//! ```
//!
//! Startups are serialized by one guard, which the background respawn also
//! takes, so two spawns can never both succeed. At most one respawn is in
//! flight at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::HostConfig;
use crate::error::{describe_exit, HostError, Result};
use crate::helper::{TroubleshootRequest, TroubleshootResponse};
use crate::metrics;
use crate::supervisor::{HelperLauncher, HelperProcess};

use super::client::{CallError, HelperClient};

/// Info shown when a fresh helper is started
pub const STARTING_NOTICE: &str = "Starting MATLAB Troubleshooter server...";
/// Info shown when a dead helper is replaced
pub const RESTARTING_NOTICE: &str = "Restarting helper server...";

/// Lifecycle phase of the helper as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperPhase {
    Idle,
    Starting,
    Healthy,
    Failed,
    Restarting,
}

/// User-facing notifications (toasts in the panel, lines in the log)
pub trait Notifier: Send + Sync {
    fn show_info(&self, message: &str);
    fn show_error(&self, message: &str);
}

/// Notifier that only writes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_info(&self, message: &str) {
        info!(notice = message, "Notification");
    }

    fn show_error(&self, message: &str) {
        error!(notice = message, "Notification");
    }
}

/// Snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub phase: HelperPhase,
    pub pid: Option<u32>,
    pub helper_url: String,
    pub spawns: u64,
    pub respawns: u64,
    pub forwarded: u64,
    pub failures: u64,
}

/// What the controller knows about its process handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handle {
    Missing,
    Alive,
    Exited(Option<i32>),
}

struct State {
    phase: HelperPhase,
    process: Option<HelperProcess>,
}

#[derive(Default)]
struct Counters {
    spawns: AtomicU64,
    respawns: AtomicU64,
    forwarded: AtomicU64,
    failures: AtomicU64,
}

struct Inner {
    config: HostConfig,
    client: HelperClient,
    launcher: Arc<dyn HelperLauncher>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<State>,
    startup: Mutex<()>,
    respawn_in_flight: AtomicBool,
    lifetime: CancellationToken,
    counters: Counters,
}

/// Per-panel owner of the helper lifecycle
#[derive(Clone)]
pub struct HostController {
    inner: Arc<Inner>,
}

impl HostController {
    pub fn new(
        config: HostConfig,
        launcher: Arc<dyn HelperLauncher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let client = HelperClient::new(config.base_url());
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                launcher,
                notifier,
                state: Mutex::new(State {
                    phase: HelperPhase::Idle,
                    process: None,
                }),
                startup: Mutex::new(()),
                respawn_in_flight: AtomicBool::new(false),
                lifetime: CancellationToken::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub async fn phase(&self) -> HelperPhase {
        self.inner.state.lock().await.phase
    }

    pub async fn status(&self) -> ControllerStatus {
        let state = self.inner.state.lock().await;
        let counters = &self.inner.counters;
        ControllerStatus {
            phase: state.phase,
            pid: state.process.as_ref().and_then(|p| p.pid()),
            helper_url: self.inner.client.base_url().to_string(),
            spawns: counters.spawns.load(Ordering::Relaxed),
            respawns: counters.respawns.load(Ordering::Relaxed),
            forwarded: counters.forwarded.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Make sure a helper answers `/health`
    ///
    /// Returns at once when the helper is already known healthy. Otherwise
    /// probes once, spawns if there is no live handle, then polls.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.phase().await == HelperPhase::Healthy {
            return Ok(());
        }

        let _startup = self.inner.startup.lock().await;
        if self.inner.lifetime.is_cancelled() {
            return Err(HostError::Cancelled);
        }
        // Another caller may have finished startup while we waited
        if self.phase().await == HelperPhase::Healthy {
            return Ok(());
        }
        self.set_phase(HelperPhase::Starting).await;

        if self.probe().await {
            info!(url = %self.inner.client.base_url(), "Helper already answering, not spawning");
            self.set_phase(HelperPhase::Healthy).await;
            return Ok(());
        }

        if !self.handle_alive().await {
            self.inner.notifier.show_info(STARTING_NOTICE);
            if let Err(e) = self.launch_and_attach("startup").await {
                self.set_phase(HelperPhase::Failed).await;
                return Err(e);
            }
        }

        let attempts = self.inner.config.startup_poll_attempts;
        let interval = self.inner.config.startup_poll_interval;
        for attempt in 1..=attempts {
            tokio::select! {
                biased;
                _ = self.inner.lifetime.cancelled() => return Err(HostError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
            if self.probe().await {
                info!(attempt, "Helper is ready");
                self.set_phase(HelperPhase::Healthy).await;
                return Ok(());
            }
            if let Handle::Exited(code) = self.check_handle().await {
                warn!(attempt, code = ?code, "Helper exited during startup");
                self.set_phase(HelperPhase::Failed).await;
                return Err(HostError::HelperExited { code });
            }
            debug!(attempt, attempts, "Waiting for helper to start");
        }

        warn!(attempts, "Helper never answered /health");
        self.set_phase(HelperPhase::Failed).await;
        Err(HostError::StartupTimeout { attempts, interval })
    }

    /// Send one troubleshoot request to the helper
    ///
    /// Exactly one HTTP call is made. A transport failure with a dead helper
    /// triggers one background respawn and waits out the grace delay before
    /// reporting the failure. The request is never re-sent.
    pub async fn forward(
        &self,
        request: &TroubleshootRequest,
        cancel: &CancellationToken,
    ) -> Result<TroubleshootResponse> {
        let span = info_span!(
            "forward",
            query_len = request.query.len(),
            improvement = !request.context.is_empty(),
        );

        async {
            self.inner.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HostError::Cancelled),
                _ = self.inner.lifetime.cancelled() => return Err(HostError::Cancelled),
                outcome = self
                    .inner
                    .client
                    .troubleshoot(request, self.inner.config.request_timeout) => outcome,
            };
            metrics::FORWARD_DURATION.observe(started.elapsed().as_secs_f64());

            let err = match outcome {
                Ok(response) => {
                    debug!(score = response.score, "Helper answered");
                    return Ok(response);
                }
                Err(err) => err,
            };
            self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);

            match err {
                CallError::Transport(message) => {
                    warn!(error = %message, "Helper unreachable");
                    self.mark_not_ready().await;

                    if !self.handle_alive().await && self.trigger_respawn() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(HostError::Cancelled),
                            _ = tokio::time::sleep(self.inner.config.respawn_grace) => {}
                        }
                    }
                    Err(HostError::UpstreamError(message))
                }
                other => {
                    warn!(error = %other, "Helper rejected request");
                    Err(HostError::UpstreamError(other.to_string()))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Force-kill the helper and refuse further startups
    pub async fn shutdown(&self) {
        self.inner.lifetime.cancel();
        let mut state = self.inner.state.lock().await;
        if let Some(mut process) = state.process.take() {
            process.kill().await;
        }
        state.phase = HelperPhase::Idle;
        metrics::HELPER_HEALTHY.set(0);
        info!("Host controller shut down");
    }

    /// Start a background respawn unless one is already running
    ///
    /// Returns false when another respawn was in flight.
    fn trigger_respawn(&self) -> bool {
        if self
            .inner
            .respawn_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Respawn already in flight");
            return false;
        }

        self.inner.notifier.show_info(RESTARTING_NOTICE);
        let controller = self.clone();
        tokio::spawn(async move {
            controller.respawn().await;
            controller
                .inner
                .respawn_in_flight
                .store(false, Ordering::Release);
        });
        true
    }

    async fn respawn(&self) {
        let _startup = self.inner.startup.lock().await;
        if self.inner.lifetime.is_cancelled() {
            return;
        }
        if self.handle_alive().await {
            // A startup replaced the handle while we waited for the guard
            return;
        }
        self.set_phase(HelperPhase::Restarting).await;
        self.inner.counters.respawns.fetch_add(1, Ordering::Relaxed);

        match self.launch_and_attach("respawn").await {
            Ok(()) => self.set_phase(HelperPhase::Starting).await,
            Err(e) => {
                error!(error = %e, "Helper respawn failed");
                self.inner
                    .notifier
                    .show_error(&format!("Failed to restart helper server: {}", e));
                self.set_phase(HelperPhase::Failed).await;
            }
        }
    }

    async fn launch_and_attach(&self, reason: &str) -> Result<()> {
        let process = self.inner.launcher.launch().await?;
        metrics::HELPER_SPAWNS.with_label_values(&[reason]).inc();
        self.inner.counters.spawns.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.state.lock().await;
        if self.inner.lifetime.is_cancelled() {
            let mut process = process;
            process.kill().await;
            return Err(HostError::Cancelled);
        }
        if let Some(mut old) = state.process.replace(process) {
            old.kill().await;
        }
        Ok(())
    }

    async fn probe(&self) -> bool {
        let ok = self.inner.client.health(self.inner.config.probe_timeout).await;
        metrics::HEALTH_PROBES
            .with_label_values(&[if ok { "ok" } else { "fail" }])
            .inc();
        ok
    }

    async fn handle_alive(&self) -> bool {
        self.check_handle().await == Handle::Alive
    }

    /// Inspect the handle, notifying the user the first time an exit is seen
    async fn check_handle(&self) -> Handle {
        let mut state = self.inner.state.lock().await;
        let Some(process) = state.process.as_mut() else {
            return Handle::Missing;
        };
        if let Some(code) = process.take_exit() {
            self.inner
                .notifier
                .show_error(&format!("Helper server exited with {}", describe_exit(&code)));
            return Handle::Exited(code);
        }
        if process.is_alive() {
            Handle::Alive
        } else {
            Handle::Exited(process.exit_code())
        }
    }

    async fn mark_not_ready(&self) {
        let mut state = self.inner.state.lock().await;
        if state.phase == HelperPhase::Healthy {
            state.phase = HelperPhase::Failed;
            metrics::HELPER_HEALTHY.set(0);
        }
    }

    async fn set_phase(&self, phase: HelperPhase) {
        let mut state = self.inner.state.lock().await;
        if state.phase != phase {
            debug!(from = ?state.phase, to = ?phase, "Helper phase change");
            state.phase = phase;
        }
        metrics::HELPER_HEALTHY.set(i64::from(phase == HelperPhase::Healthy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FailingLauncher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HelperLauncher for FailingLauncher {
        async fn launch(&self) -> Result<HelperProcess> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HostError::RuntimeNotFound)
        }
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn fast_config(port: u16) -> HostConfig {
        HostConfig {
            helper_port: port,
            startup_poll_attempts: 3,
            startup_poll_interval: Duration::from_millis(10),
            probe_timeout: Duration::from_millis(200),
            respawn_grace: Duration::from_millis(10),
            request_timeout: Duration::from_secs(2),
            ..HostConfig::default()
        }
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_phase_failed() {
        let launcher = Arc::new(FailingLauncher {
            calls: AtomicUsize::new(0),
        });
        let controller =
            HostController::new(fast_config(unused_port()), launcher.clone(), Arc::new(LogNotifier));

        let err = controller.ensure_ready().await.unwrap_err();
        assert!(matches!(err, HostError::RuntimeNotFound));
        assert_eq!(controller.phase().await, HelperPhase::Failed);
        assert_eq!(launcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_startup() {
        let launcher = Arc::new(FailingLauncher {
            calls: AtomicUsize::new(0),
        });
        let controller =
            HostController::new(fast_config(unused_port()), launcher.clone(), Arc::new(LogNotifier));

        controller.shutdown().await;
        assert!(matches!(
            controller.ensure_ready().await,
            Err(HostError::Cancelled)
        ));
        assert_eq!(launcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.phase().await, HelperPhase::Idle);
    }

    #[tokio::test]
    async fn test_forward_cancelled_token() {
        let launcher = Arc::new(FailingLauncher {
            calls: AtomicUsize::new(0),
        });
        let controller =
            HostController::new(fast_config(unused_port()), launcher, Arc::new(LogNotifier));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = controller
            .forward(&TroubleshootRequest::new("q", ""), &cancel)
            .await;
        assert!(matches!(result, Err(HostError::Cancelled)));
    }
}
