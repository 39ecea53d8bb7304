//! The helper side of the loopback contract
//!
//! - `protocol` - request/response bodies shared with the host client
//! - `responder` - regex-matched canned answers
//! - `server` - axum router serving `/health` and `/troubleshoot`

pub mod protocol;
pub mod responder;
pub mod server;

pub use protocol::{ErrorBody, HealthStatus, TroubleshootRequest, TroubleshootResponse};
pub use responder::{respond, Answer, Template};
