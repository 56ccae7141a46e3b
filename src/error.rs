//! Engine error types

use crate::core::OperationKind;
use thiserror::Error;

/// Errors raised by the pipeline engine itself
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stage {index} ({stage}) failed: {source}")]
    Stage {
        index: usize,
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{kind} stage expects a sequence, got {found}")]
    NotASequence {
        kind: OperationKind,
        found: &'static str,
    },

    #[error("{kind} stage cannot take a {handler} handler")]
    HandlerMismatch {
        kind: OperationKind,
        handler: &'static str,
    },

    #[error("pipeline '{child}' is already part of the ancestry of '{parent}'")]
    CompositionCycle { parent: String, child: String },

    #[error("pipeline '{0}' is already embedded in another pipeline")]
    AlreadyEmbedded(String),

    #[error("handler task failed: {0}")]
    HandlerPanicked(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
