//! MATLAB Troubleshooter - local chat panel backed by a supervised helper process
//!
//! A panel forwards questions to a helper HTTP process on loopback, which
//! answers with pattern-matched MATLAB advice. The library owns the helper's
//! lifecycle and the message contract between panel and host.
//!
//! # Modules
//!
//! - `supervisor` - interpreter and program discovery, helper spawn
//! - `host` - helper client and lifecycle controller (readiness, respawn)
//! - `bridge` - panel message handling
//! - `panel` - web panel, transcript model, markdown rendering
//! - `helper` - native implementation of the helper's HTTP contract
//! - `config` - host configuration and settings files
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use matlab_troubleshooter::{ChatBridge, HostConfig, HostController, LogNotifier, Supervisor};
//!
//! let config = HostConfig::default();
//! let supervisor = Supervisor::from_config(&config, settings, provider, picker);
//! let controller = HostController::new(config, Arc::new(supervisor), Arc::new(LogNotifier));
//! let bridge = ChatBridge::new(controller, Arc::new(LogNotifier));
//!
//! let reply = bridge
//!     .handle(InboundMessage::AskQuestion { text: "Index exceeds matrix dimensions".into() })
//!     .await;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod helper;
pub mod host;
pub mod metrics;
pub mod panel;
pub mod supervisor;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use bridge::{ChatBridge, InboundMessage, OutboundMessage};
pub use config::{HostConfig, Settings};
pub use error::{HostError, Result};
pub use host::{HelperPhase, HostController, LogNotifier, Notifier};
pub use panel::{PanelConfig, PanelState};
pub use supervisor::{HelperLauncher, InterpreterPicker, Supervisor};
