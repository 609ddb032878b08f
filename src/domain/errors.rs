//! Domain errors for the BioChat pipeline.

use thiserror::Error;

use crate::domain::models::{CallStatus, SourceId};
use crate::domain::ports::LlmError;

/// Domain-level errors raised by model invariants.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: CallStatus, to: CallStatus },

    #[error("Call {dependent} cannot depend on call {dependency}: dependencies must precede dependents")]
    InvalidDependency { dependent: usize, dependency: usize },

    #[error("Source not registered: {0}")]
    SourceNotRegistered(SourceId),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// The only error `process` surfaces to callers.
///
/// Every source-level failure is absorbed into `ToolResult`s; only an
/// unrecoverable LLM completion failure aborts a query.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("LLM completion failed during {phase}: {source}")]
    Completion {
        phase: &'static str,
        #[source]
        source: LlmError,
    },
}

impl FatalError {
    pub fn completion(phase: &'static str, source: LlmError) -> Self {
        Self::Completion { phase, source }
    }
}
