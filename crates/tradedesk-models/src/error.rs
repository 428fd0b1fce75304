use thiserror::Error;

use crate::analyst::AnalystKind;

/// A delta was rejected by the run state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("run already concluded; state is read-only")]
    Concluded,

    #[error("debate already concluded with a verdict")]
    DebateConcluded,

    #[error("out of turn: expected {expected}, got {got}")]
    OutOfTurn { expected: String, got: String },

    #[error("round {round} cannot advance: {reason}")]
    RoundNotComplete { round: u32, reason: String },

    #[error("round limit {0} reached")]
    RoundLimitReached(u32),

    #[error("verdict not allowed yet: {0}")]
    VerdictNotAllowed(String),

    #[error("analyst {0} was not requested for this run")]
    NotRequested(AnalystKind),

    #[error("analyst {0} already reported")]
    AlreadyReported(AnalystKind),

    #[error("stage order violated: {0}")]
    StageOrder(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid subject '{0}': expected 1-10 letters, '.' or '-'")]
    InvalidSubject(String),

    #[error("{name} = {value} exceeds the maximum of {max}")]
    RoundLimit { name: &'static str, value: u32, max: u32 },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
