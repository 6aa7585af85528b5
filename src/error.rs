//! Error types shared by every module of the crate.

use crate::framework::LoopPhase;
use thiserror::Error;

/// Result type for evolution operations
pub type EvoResult<T> = Result<T, EvoError>;

/// Error types for evolution operations
#[derive(Error, Debug)]
pub enum EvoError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("template line {line}: {reason}")]
    Template { line: usize, reason: String },

    #[error("unknown cell type label: {0}")]
    UnknownCellType(String),

    #[error("unknown activation function label: {0}")]
    UnknownActivation(String),

    #[error("graph integrity violated in network {network}: {reason}")]
    Integrity { network: String, reason: String },

    #[error("tournament size {size} exceeds population of {population}")]
    TournamentTooLarge { size: usize, population: usize },

    #[error("cannot {action} during the {phase} phase")]
    OutOfPhase {
        action: &'static str,
        phase: LoopPhase,
    },

    #[error("expected {expected} telemetry records, got {found}")]
    TelemetryMismatch { expected: usize, found: usize },

    #[error("cannot select from an empty population")]
    EmptyPopulation,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvoError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn template(line: usize, reason: impl Into<String>) -> Self {
        Self::Template {
            line,
            reason: reason.into(),
        }
    }
}
