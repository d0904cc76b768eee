//! Error types for the wave batcher

use thiserror::Error;

/// Main error type for batch planning and execution
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch failed validation: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Operation {id} not found in batch")]
    UnknownOperation { id: String },

    #[error("Invalid state transition for {id} from {from} to {to}")]
    InvalidStateTransition { id: String, from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Check if error rejects the batch before any submission happens
    pub fn blocks_planning(&self) -> bool {
        matches!(
            self,
            BatchError::Validation { .. }
                | BatchError::CyclicDependency { .. }
                | BatchError::UnknownOperation { .. }
        )
    }
}

/// Result type for batch operations
pub type BatchResult<T> = Result<T, BatchError>;
