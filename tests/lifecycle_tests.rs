//! Integration tests for the helper lifecycle, the chat bridge and the panel
//!
//! A test launcher stands in for the supervisor: it spawns a harmless shell
//! process as the helper handle and, when asked to, serves the native helper
//! in-process on the configured port. Tests that need a real Python helper
//! are marked #[ignore].

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use matlab_troubleshooter::bridge::{ChatBridge, InboundMessage, OutboundMessage};
use matlab_troubleshooter::helper::{server, TroubleshootRequest};
use matlab_troubleshooter::host::{HelperPhase, HostController, Notifier};
use matlab_troubleshooter::panel::{NoticeBoard, PanelState};
use matlab_troubleshooter::supervisor::{HelperLauncher, HelperProcess};
use matlab_troubleshooter::{HostConfig, HostError};

// ============================================================================
// Fixtures
// ============================================================================

fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(port: u16) -> HostConfig {
    HostConfig {
        helper_port: port,
        startup_poll_attempts: 20,
        startup_poll_interval: Duration::from_millis(50),
        probe_timeout: Duration::from_millis(500),
        respawn_grace: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
        ..HostConfig::default()
    }
}

/// Serve the native helper on `port` until `stop` is cancelled
async fn serve_helper(port: u16, stop: CancellationToken) {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    tokio::spawn(async move {
        let _ = server::serve(listener, async move { stop.cancelled().await }).await;
    });
}

struct TestLauncher {
    port: u16,
    serve: bool,
    script: PathBuf,
    launches: AtomicUsize,
    stop: CancellationToken,
    _dir: tempfile::TempDir,
}

impl TestLauncher {
    fn new(port: u16, serve: bool) -> Arc<Self> {
        Self::with_script(port, serve, "exec sleep 30\n")
    }

    /// Launcher whose helper handle runs `body` under /bin/sh
    fn with_script(port: u16, serve: bool, body: &str) -> Arc<Self> {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("helper.sh");
        std::fs::write(&script, body).unwrap();
        Arc::new(Self {
            port,
            serve,
            script,
            launches: AtomicUsize::new(0),
            stop: CancellationToken::new(),
            _dir: dir,
        })
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Drop for TestLauncher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl HelperLauncher for TestLauncher {
    async fn launch(&self) -> matlab_troubleshooter::Result<HelperProcess> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.serve {
            serve_helper(self.port, self.stop.clone()).await;
        }
        HelperProcess::spawn(&PathBuf::from("/bin/sh"), &self.script)
    }
}

struct FailingLauncher;

#[async_trait]
impl HelperLauncher for FailingLauncher {
    async fn launch(&self) -> matlab_troubleshooter::Result<HelperProcess> {
        Err(HostError::RuntimeNotFound)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn show_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// ensure_ready
// ============================================================================

/// Test that the first ensure_ready spawns and later calls use the cached phase
#[tokio::test]
async fn test_ensure_ready_spawns_then_caches() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(test_config(port), launcher.clone(), notifier.clone());

    controller.ensure_ready().await.unwrap();
    assert_eq!(controller.phase().await, HelperPhase::Healthy);
    assert_eq!(launcher.launches(), 1);
    assert_eq!(
        notifier.infos.lock().unwrap().as_slice(),
        ["Starting MATLAB Troubleshooter server..."]
    );

    controller.ensure_ready().await.unwrap();
    assert_eq!(launcher.launches(), 1);

    controller.shutdown().await;
}

/// Test that a helper already answering is adopted without spawning
#[tokio::test]
async fn test_ensure_ready_adopts_running_helper() {
    let port = unused_port();
    let stop = CancellationToken::new();
    serve_helper(port, stop.clone()).await;

    let launcher = TestLauncher::new(port, false);
    let controller = HostController::new(
        test_config(port),
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    controller.ensure_ready().await.unwrap();
    assert_eq!(launcher.launches(), 0);
    assert_eq!(controller.phase().await, HelperPhase::Healthy);
    stop.cancel();
}

/// Test that polling stops after the configured attempts
#[tokio::test]
async fn test_ensure_ready_times_out_and_keeps_handle() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, false);
    let mut config = test_config(port);
    config.startup_poll_attempts = 3;
    config.startup_poll_interval = Duration::from_millis(40);
    let controller = HostController::new(config, launcher.clone(), Arc::new(RecordingNotifier::default()));

    let started = Instant::now();
    let err = controller.ensure_ready().await.unwrap_err();
    assert!(matches!(err, HostError::StartupTimeout { attempts: 3, .. }));
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert_eq!(controller.phase().await, HelperPhase::Failed);

    // The handle stays attached, so the retry polls again without spawning
    let _ = controller.ensure_ready().await;
    assert_eq!(launcher.launches(), 1);
    assert!(controller.status().await.pid.is_some());

    controller.shutdown().await;
}

/// Test that a helper exiting during startup ends polling early and is reported
#[tokio::test]
async fn test_ensure_ready_reports_helper_exit() {
    let port = unused_port();
    let launcher = TestLauncher::with_script(port, false, "exit 3\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(test_config(port), launcher.clone(), notifier.clone());

    let started = Instant::now();
    let err = controller.ensure_ready().await.unwrap_err();

    assert!(matches!(err, HostError::HelperExited { code: Some(3) }));
    // 20 polls at 50 ms would take a full second
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(controller.phase().await, HelperPhase::Failed);
    assert_eq!(
        notifier.errors.lock().unwrap().as_slice(),
        ["Helper server exited with code 3"]
    );

    // The next attempt replaces the dead handle
    let _ = controller.ensure_ready().await;
    assert_eq!(launcher.launches(), 2);
    assert_eq!(notifier.errors.lock().unwrap().len(), 2);
}

/// Test that concurrent startups spawn a single helper
#[tokio::test]
async fn test_concurrent_ensure_ready_single_spawn() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let controller = HostController::new(
        test_config(port),
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    let results = join_all((0..4).map(|_| {
        let controller = controller.clone();
        async move { controller.ensure_ready().await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(launcher.launches(), 1);
    controller.shutdown().await;
}

// ============================================================================
// forward
// ============================================================================

/// Test that concurrent transport failures with a dead handle respawn once
#[tokio::test]
async fn test_transport_failures_respawn_once() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, false);
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(test_config(port), launcher.clone(), notifier.clone());
    let cancel = CancellationToken::new();

    let request = TroubleshootRequest::new("Index exceeds matrix dimensions", "");
    let results = join_all((0..3).map(|_| controller.forward(&request, &cancel))).await;

    for result in &results {
        assert!(matches!(result, Err(HostError::UpstreamError(_))));
    }

    // Let the background respawn finish
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(launcher.launches(), 1);
    assert_eq!(controller.status().await.respawns, 1);
    assert!(notifier
        .infos
        .lock()
        .unwrap()
        .iter()
        .any(|m| m == "Restarting helper server..."));

    controller.shutdown().await;
}

/// Test that only the failure that triggered the respawn waits out the grace delay
#[tokio::test]
async fn test_respawning_failure_waits_grace_delay() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, false);
    let mut config = test_config(port);
    config.respawn_grace = Duration::from_millis(300);
    let controller = HostController::new(config, launcher.clone(), Arc::new(RecordingNotifier::default()));
    let request = TroubleshootRequest::new("q", "");

    let started = Instant::now();
    let err = controller
        .forward(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::UpstreamError(_)));
    assert!(started.elapsed() >= Duration::from_millis(300));

    // The respawned handle is alive, so a second failure neither respawns nor waits
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launcher.launches(), 1);
    let started = Instant::now();
    let _ = controller.forward(&request, &CancellationToken::new()).await;
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(launcher.launches(), 1);
    assert_eq!(controller.status().await.respawns, 1);

    controller.shutdown().await;
}

/// Test that a transport failure with a live helper process does not respawn
#[tokio::test]
async fn test_transport_failure_with_live_handle_does_not_respawn() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, false);
    let mut config = test_config(port);
    config.startup_poll_attempts = 2;
    config.startup_poll_interval = Duration::from_millis(20);
    let controller = HostController::new(config, launcher.clone(), Arc::new(RecordingNotifier::default()));

    // Attach a long-running process with nothing listening behind it
    assert!(controller.ensure_ready().await.is_err());
    assert_eq!(launcher.launches(), 1);

    let err = controller
        .forward(&TroubleshootRequest::new("q", ""), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::UpstreamError(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launcher.launches(), 1);
    assert_eq!(controller.status().await.respawns, 0);

    controller.shutdown().await;
}

/// Test that an error status from a live helper is reported without respawning
#[tokio::test]
async fn test_error_status_does_not_respawn() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new().route(
        "/troubleshoot",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "processor crashed" })),
            )
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let launcher = TestLauncher::new(port, false);
    let controller = HostController::new(
        test_config(port),
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    let err = controller
        .forward(&TroubleshootRequest::new("q", ""), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        HostError::UpstreamError(message) => assert!(message.contains("processor crashed")),
        other => panic!("unexpected error: {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launcher.launches(), 0);
}

// ============================================================================
// Chat bridge
// ============================================================================

/// Test an ask, an improvement and a feedback message through the bridge
#[tokio::test]
async fn test_bridge_round_trip() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(test_config(port), launcher.clone(), notifier.clone());
    let bridge = ChatBridge::new(controller, notifier.clone());

    let reply = bridge
        .handle(InboundMessage::AskQuestion {
            text: "Index exceeds matrix dimensions".into(),
        })
        .await
        .unwrap();
    match reply {
        OutboundMessage::Response { score, sources, .. } => {
            assert_eq!(score, 0.95);
            assert_eq!(sources, vec!["MATLAB Documentation".to_string()]);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let improved = bridge
        .handle(InboundMessage::ImprovementFeedback {
            original_query: "Index exceeds matrix dimensions".into(),
            feedback: "show a loop example".into(),
            message_id: "msg_1".into(),
        })
        .await
        .unwrap();
    match improved {
        OutboundMessage::ImprovedResponse {
            original_message_id,
            score,
            explanation,
            ..
        } => {
            assert_eq!(original_message_id, "msg_1");
            assert_eq!(score, 0.9);
            assert_eq!(explanation, "Improved based on feedback");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let none = bridge
        .handle(InboundMessage::Feedback {
            message_id: "msg_1".into(),
            is_positive: true,
            content: String::new(),
        })
        .await;
    assert!(none.is_none());
    assert_eq!(launcher.launches(), 1);
    assert!(notifier.errors.lock().unwrap().is_empty());

    bridge.close().await;
}

/// Test that a startup failure yields both a notification and an inline error
#[tokio::test]
async fn test_bridge_startup_failure_reported_twice() {
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(
        test_config(unused_port()),
        Arc::new(FailingLauncher),
        notifier.clone(),
    );
    let bridge = ChatBridge::new(controller, notifier.clone());

    let reply = bridge
        .handle(InboundMessage::AskQuestion { text: "x".into() })
        .await
        .unwrap();

    assert!(reply.is_error());
    let errors = notifier.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Python interpreter is required but not found"));
}

/// Test that closing the bridge kills the helper and refuses new work
#[tokio::test]
async fn test_bridge_close_kills_helper() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(test_config(port), launcher.clone(), notifier.clone());
    let bridge = ChatBridge::new(controller.clone(), notifier);

    controller.ensure_ready().await.unwrap();
    assert!(controller.status().await.pid.is_some());

    bridge.close().await;
    assert_eq!(controller.phase().await, HelperPhase::Idle);
    assert!(controller.status().await.pid.is_none());

    let reply = bridge
        .handle(InboundMessage::AskQuestion { text: "x".into() })
        .await
        .unwrap();
    assert!(reply.is_error());
}

// ============================================================================
// Panel
// ============================================================================

/// Test that a startup failure while opening the panel is shown on the page
#[tokio::test]
async fn test_panel_open_reports_startup_failure() {
    use matlab_troubleshooter::bridge::STARTUP_FAILED_TEXT;
    use matlab_troubleshooter::panel::NoticeLevel;

    let notices = Arc::new(NoticeBoard::new());
    let controller = HostController::new(
        test_config(unused_port()),
        Arc::new(FailingLauncher),
        notices.clone(),
    );
    let panel = PanelState::new(ChatBridge::new(controller, notices.clone()), notices.clone());

    panel.open().await;

    let errors: Vec<_> = notices
        .recent()
        .into_iter()
        .filter(|n| n.level == NoticeLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains("Python interpreter is required but not found"));

    let transcript = panel.transcript().await;
    let last = transcript.messages().last().unwrap();
    assert!(last.is_error);
    assert_eq!(last.text, STARTUP_FAILED_TEXT);
    assert!(transcript.pending().is_empty());
}

/// Test that a successful open leaves only the welcome message
#[tokio::test]
async fn test_panel_open_starts_helper() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let notices = Arc::new(NoticeBoard::new());
    let controller = HostController::new(test_config(port), launcher.clone(), notices.clone());
    let panel = PanelState::new(ChatBridge::new(controller, notices.clone()), notices);

    panel.open().await;

    assert_eq!(launcher.launches(), 1);
    let transcript = panel.transcript().await;
    assert_eq!(transcript.messages().len(), 1);
    assert!(transcript.pending().is_empty());

    panel.close().await;
}

/// Test that an improvement updates the original message in the transcript
#[tokio::test]
async fn test_panel_improvement_replaces_message() {
    let port = unused_port();
    let launcher = TestLauncher::new(port, true);
    let notices = Arc::new(NoticeBoard::new());
    let controller = HostController::new(test_config(port), launcher.clone(), notices.clone());
    let panel = PanelState::new(ChatBridge::new(controller, notices.clone()), notices);

    let first = panel
        .dispatch(InboundMessage::AskQuestion {
            text: "Index exceeds matrix dimensions".into(),
        })
        .await;
    let second = panel
        .dispatch(InboundMessage::AskQuestion {
            text: "undefined function foo".into(),
        })
        .await;
    let first_id = first.message_id.unwrap();
    let second_id = second.message_id.unwrap();
    let sibling_before = panel.transcript().await.get(&second_id).cloned();

    // Empty originalQuery: the panel looks the question up itself
    let improved = panel
        .dispatch(InboundMessage::ImprovementFeedback {
            original_query: String::new(),
            feedback: "more detail".into(),
            message_id: first_id.clone(),
        })
        .await;
    assert_eq!(improved.message_id.as_deref(), Some(first_id.as_str()));

    let transcript = panel.transcript().await;
    let target = transcript.get(&first_id).unwrap();
    assert!(target.improved);
    assert_eq!(target.confidence_score, 0.9);
    assert!(target.text.contains("more detail"));
    assert_eq!(transcript.get(&second_id).cloned(), sibling_before);
    assert_eq!(transcript.get(&second_id).unwrap().confidence_score, 0.9);
    assert!(transcript.pending().is_empty());
    // welcome + 2 questions + 2 answers
    assert_eq!(transcript.messages().len(), 5);

    panel.close().await;
}

/// Test the real interpreter path with the materialized default program
#[tokio::test]
#[ignore = "Requires python3 with flask installed"]
async fn test_real_helper_with_materialized_program() {
    use matlab_troubleshooter::supervisor::{EnvInterpreterProvider, NoPicker, Supervisor};
    use matlab_troubleshooter::Settings;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(unused_port());
    config.extension_dir = dir.path().to_path_buf();
    config.startup_poll_interval = Duration::from_secs(1);
    config.startup_poll_attempts = 10;

    let supervisor = Supervisor::from_config(
        &config,
        Settings::default(),
        Arc::new(EnvInterpreterProvider::new()),
        Arc::new(NoPicker),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = HostController::new(config, Arc::new(supervisor), notifier.clone());
    let bridge = ChatBridge::new(controller, notifier);

    let reply = bridge
        .handle(InboundMessage::AskQuestion {
            text: "Index exceeds matrix dimensions".into(),
        })
        .await
        .unwrap();
    assert!(matches!(reply, OutboundMessage::Response { score, .. } if score == 0.95));
    assert!(dir.path().join("server").join("api_adapter.py").exists());

    bridge.close().await;
}
