//! Planning and execution of dependent operation batches
//!
//! The pipeline:
//! 1. Sorts operations so dependencies come first
//! 2. Groups ready operations into waves, one per target
//! 3. Executes waves in order with a barrier between them
//! 4. Applies required/optional failure semantics

pub mod dependency;
pub mod engine;
pub mod executor;
pub mod planner;

pub use dependency::{
    sort_operations, CyclePolicy, DependencyGraph, DroppedEdge, SortedBatch, TopologicalOrder,
};
pub use engine::{BatchEngine, BatchReport, PlannedBatch};
pub use executor::{BatchExecutor, ExecutionResult, OperationOutcome, OperationState};
pub use planner::{ExecutionPlan, ExecutionWave, PlanAnomaly, PlanBuilder};
