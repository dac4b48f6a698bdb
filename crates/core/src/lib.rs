pub mod config;
pub mod errors;
pub mod policy;
pub mod record;
pub mod session;

pub use errors::OrchestratorError;
pub use policy::{detect_crisis, KbAccessDecision, KbAccessPolicy, KbDenyReason, OPT_IN_INTENT};
pub use record::{CallRecord, CallStats, DEFAULT_CALL_DURATION_S, DEFAULT_END_REASON};
pub use session::{Language, Session, SessionMetrics, SessionStore, SharedSession};
