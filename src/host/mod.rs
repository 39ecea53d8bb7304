//! Host side of the helper connection
//!
//! - `client` - HTTP calls to the helper (`/health`, `/troubleshoot`)
//! - `controller` - helper lifecycle, readiness and guarded respawn

pub mod client;
pub mod controller;

pub use client::{CallError, HelperClient};
pub use controller::{ControllerStatus, HelperPhase, HostController, LogNotifier, Notifier};
