use thiserror::Error;

/// Errors the orchestrator surfaces to callers. Collaborator failures (KB,
/// persistence, telephony) are absorbed fail-open and never appear here;
/// an unacknowledged webhook would trigger vendor-side retry storms.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("no live session for call `{call_id}`")]
    SessionNotFound { call_id: String },
    #[error("webhook credential missing or mismatched")]
    Unauthorized,
}

impl OrchestratorError {
    /// Stable wire code included in `{ok:false, error:...}` bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "session_not_found",
            Self::Unauthorized => "unauthorized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrchestratorError;

    #[test]
    fn wire_codes_are_stable() {
        let not_found = OrchestratorError::SessionNotFound { call_id: "c1".to_owned() };
        assert_eq!(not_found.error_code(), "session_not_found");
        assert_eq!(OrchestratorError::Unauthorized.error_code(), "unauthorized");
    }

    #[test]
    fn session_not_found_names_the_call() {
        let error = OrchestratorError::SessionNotFound { call_id: "c9".to_owned() };
        assert!(error.to_string().contains("c9"));
    }
}
