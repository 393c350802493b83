use std::fmt::Display;

use latchproof_ir::IrError;
use latchproof_sat::EncodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdrError {
    /// A solver budget or deadline ran out. The driver turns this into an
    /// UNDECIDED verdict.
    #[error("Resource limit reached: {0}")]
    ResourceExhausted(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Internal invariant violated: {0}")]
    InternalInvariantViolation(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<IrError> for PdrError {
    fn from(err: IrError) -> Self {
        PdrError::MalformedInput(err.to_string())
    }
}

impl<E: Display> From<EncodeError<E>> for PdrError {
    fn from(err: EncodeError<E>) -> Self {
        match err {
            EncodeError::MissingNode(_) => PdrError::MalformedInput(err.to_string()),
            EncodeError::Solver(inner) => PdrError::solver(inner),
        }
    }
}

impl PdrError {
    pub(crate) fn solver(err: impl Display) -> Self {
        PdrError::Solver(err.to_string())
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, PdrError::ResourceExhausted(_))
    }
}
