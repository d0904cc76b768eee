//! Structural validation of a batch before planning
//!
//! Errors make a batch unplannable; warnings are surfaced but do not block.
//! Cycle detection is left to the dependency sorter.

use super::BatchOperation;
use crate::config::PlannerConfig;

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// A single validation finding
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("duplicate operation id: {id}")]
    DuplicateId { id: String },

    #[error("dangling dependency: {id} depends on unknown operation {dependency}")]
    DanglingDependency { id: String, dependency: String },

    #[error("self dependency: {id} depends on itself")]
    SelfDependency { id: String },

    #[error("duplicate dependency entry: {id} lists {dependency} more than once")]
    DuplicateDependency { id: String, dependency: String },

    #[error("large batch of {size} operations (limit {limit}); consider splitting")]
    LargeBatch { size: usize, limit: usize },

    #[error("gas limit {gas_limit} for {id} is below the minimum of {floor}")]
    GasBelowFloor { id: String, gas_limit: u64, floor: u64 },

    #[error("gas limit {gas_limit} for {id} exceeds the maximum of {ceiling}")]
    GasAboveCeiling { id: String, gas_limit: u64, ceiling: u64 },
}

/// Outcome of validating a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Error messages, in discovery order
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Warning messages, in discovery order
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Validator for batch structure and gas bounds
#[derive(Debug, Clone)]
pub struct BatchValidator {
    max_batch_size: usize,
    min_gas_limit: u64,
    max_gas_limit: u64,
}

impl BatchValidator {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            min_gas_limit: config.min_gas_limit,
            max_gas_limit: config.max_gas_limit,
        }
    }

    /// Validate a batch without mutating it
    pub fn validate(&self, operations: &[BatchOperation]) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut ids = HashSet::with_capacity(operations.len());
        for op in operations {
            if !ids.insert(op.id.as_str()) {
                errors.push(ValidationIssue::DuplicateId { id: op.id.clone() });
            }
        }

        for op in operations {
            let mut seen = HashSet::new();
            for dep in &op.dependencies {
                if dep == &op.id {
                    errors.push(ValidationIssue::SelfDependency { id: op.id.clone() });
                } else if !ids.contains(dep.as_str()) {
                    errors.push(ValidationIssue::DanglingDependency {
                        id: op.id.clone(),
                        dependency: dep.clone(),
                    });
                }

                if !seen.insert(dep.as_str()) {
                    warnings.push(ValidationIssue::DuplicateDependency {
                        id: op.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            if op.gas_limit < self.min_gas_limit {
                warnings.push(ValidationIssue::GasBelowFloor {
                    id: op.id.clone(),
                    gas_limit: op.gas_limit,
                    floor: self.min_gas_limit,
                });
            } else if op.gas_limit > self.max_gas_limit {
                warnings.push(ValidationIssue::GasAboveCeiling {
                    id: op.id.clone(),
                    gas_limit: op.gas_limit,
                    ceiling: self.max_gas_limit,
                });
            }
        }

        if operations.len() > self.max_batch_size {
            warnings.push(ValidationIssue::LargeBatch {
                size: operations.len(),
                limit: self.max_batch_size,
            });
        }

        if errors.is_empty() {
            debug!(
                "Validated batch of {} operations ({} warnings)",
                operations.len(),
                warnings.len()
            );
        } else {
            warn!(
                "Batch of {} operations failed validation with {} errors",
                operations.len(),
                errors.len()
            );
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl Default for BatchValidator {
    fn default() -> Self {
        Self::new(&PlannerConfig::default())
    }
}
