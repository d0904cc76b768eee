//! Batch operations and structural validation
//!
//! A batch is a flat list of [`BatchOperation`]s with declared dependency
//! edges between them. Operations are built by the caller and never mutated
//! by the planner or executor; outcomes are recorded separately.

mod validator;

pub use validator::{BatchValidator, ValidationIssue, ValidationReport};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum gas any operation can consume (a plain value transfer)
pub const MIN_GAS_LIMIT: u64 = 21_000;

/// Gas limits above this are unlikely to fit in a block
pub const MAX_GAS_LIMIT: u64 = 30_000_000;

/// Batches larger than this should be split
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Tie-break hint for conflicting operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A single write operation against an addressable target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperation {
    /// Unique within a batch
    pub id: String,
    /// Resource the operation acts on (e.g. a contract address)
    pub target: String,
    /// Opaque call data
    #[serde(default)]
    pub payload: String,
    /// Value attached to the operation
    #[serde(default)]
    pub value_amount: U256,
    /// Upper bound on resource cost
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub priority: Priority,
    /// Ids that must complete before this operation starts
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Failure of a required operation aborts the rest of the batch
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_gas_limit() -> u64 {
    MIN_GAS_LIMIT
}

fn default_required() -> bool {
    true
}

impl BatchOperation {
    /// Start building an operation with defaults for every optional field
    pub fn builder(id: impl Into<String>, target: impl Into<String>) -> OperationBuilder {
        OperationBuilder::new(id, target)
    }

    /// Check if this operation declares a dependency on `id`
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|dep| dep == id)
    }
}

/// Fluent constructor for [`BatchOperation`]
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    op: BatchOperation,
}

impl OperationBuilder {
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            op: BatchOperation {
                id: id.into(),
                target: target.into(),
                payload: String::new(),
                value_amount: U256::ZERO,
                gas_limit: default_gas_limit(),
                priority: Priority::default(),
                dependencies: Vec::new(),
                required: default_required(),
            },
        }
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.op.payload = payload.into();
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.op.value_amount = value;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.op.gas_limit = gas_limit;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.op.priority = priority;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.op.dependencies.push(id.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.op.required = required;
        self
    }

    pub fn build(self) -> BatchOperation {
        self.op
    }
}
