//! Wave Batcher - dependency-aware transaction batching
//!
//! Takes a batch of interdependent write operations, orders them so every
//! dependency runs first, groups independent operations on distinct targets
//! into concurrent waves, and executes the waves against an injected
//! submitter with required/optional failure semantics.

pub mod batch;
pub mod config;
pub mod coordination;
pub mod error;
pub mod metrics;
pub mod tx;

pub use batch::{BatchOperation, BatchValidator, Priority, ValidationIssue, ValidationReport};
pub use config::Settings;
pub use coordination::{
    BatchEngine, BatchReport, CyclePolicy, ExecutionPlan, ExecutionResult, ExecutionWave,
    OperationState,
};
pub use error::{BatchError, BatchResult};
pub use tx::{DryRunSubmitter, FnSubmitter, GasPricer, SubmissionOutcome, Submitter};
