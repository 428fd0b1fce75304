use thiserror::Error;
use tradedesk_models::{AnalystKind, ConfigError, StateError};

/// Failure of a single generation or tool call.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Worth retrying: rate limits, overloaded backends, dropped connections.
    #[error("Transient generation error: {0}")]
    Transient(String),

    #[error("Fatal generation error: {0}")]
    Fatal(String),

    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Data tool error: {0}")]
    Tool(String),
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transient(_) | AgentError::Timeout(_))
    }
}

/// Why a run ended without any decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoDecisionReason {
    #[error("all {} requested analysts failed", failures.len())]
    AllAnalystsFailed { failures: Vec<(AnalystKind, String)> },

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
}

/// Terminal failure of a run.
///
/// A run that concludes with an undetermined signal is not an error; see
/// [`tradedesk_models::RunState::decision_status`].
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("No decision possible: {0}")]
    NoDecision(NoDecisionReason),

    #[error("Run timed out after {0} seconds")]
    Timeout(u64),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid state transition: {0}")]
    State(#[from] StateError),

    /// The background run task ended abnormally.
    #[error("Run task failed: {0}")]
    Task(String),
}

impl RunError {
    pub fn is_no_decision(&self) -> bool {
        matches!(self, RunError::NoDecision(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(AgentError::Transient("429".into()).is_retryable());
        assert!(AgentError::Timeout(30).is_retryable());
        assert!(!AgentError::Fatal("bad request".into()).is_retryable());
        assert!(!AgentError::Tool("missing".into()).is_retryable());
    }

    #[test]
    fn no_decision_display() {
        let err = RunError::NoDecision(NoDecisionReason::AllAnalystsFailed {
            failures: vec![
                (AnalystKind::Market, "timeout".into()),
                (AnalystKind::News, "timeout".into()),
            ],
        });
        assert!(err.is_no_decision());
        assert_eq!(
            err.to_string(),
            "No decision possible: all 2 requested analysts failed"
        );
        assert!(!RunError::Cancelled.is_no_decision());
    }
}
