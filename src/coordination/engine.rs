//! Batch pipeline: validate, sort, plan, execute
//!
//! The engine is an explicitly constructed value holding only injected
//! configuration. It keeps no state between calls, so one instance can serve
//! any number of concurrent batches.

use super::dependency::{sort_operations, CyclePolicy};
use super::executor::{BatchExecutor, ExecutionResult};
use super::planner::{ExecutionPlan, PlanAnomaly, PlanBuilder};
use crate::batch::{BatchOperation, BatchValidator, ValidationReport};
use crate::config::Settings;
use crate::error::{BatchError, BatchResult};
use crate::tx::{DryRunSubmitter, FixedGasPrice, GasEstimator, GasPricer, Submitter};

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A validated batch and its plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedBatch {
    pub validation: ValidationReport,
    pub plan: ExecutionPlan,
}

/// Everything produced for one batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub validation: ValidationReport,
    pub plan: ExecutionPlan,
    pub result: ExecutionResult,
}

impl BatchReport {
    pub fn to_json_pretty(&self) -> BatchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Wires the validator, sorter, planner and executor together
#[derive(Debug, Clone)]
pub struct BatchEngine {
    validator: BatchValidator,
    cycle_policy: CyclePolicy,
    planner: PlanBuilder,
    executor: BatchExecutor,
}

impl BatchEngine {
    /// Create an engine pricing gas at the configured flat rate
    pub fn new(settings: &Settings) -> Self {
        let pricer = Arc::new(FixedGasPrice::new(settings.pricing.gas_price_wei));
        Self::with_pricer(settings, pricer)
    }

    /// Create an engine with a caller-supplied price function
    pub fn with_pricer(settings: &Settings, pricer: Arc<dyn GasPricer>) -> Self {
        let estimator = GasEstimator::new(pricer);
        Self {
            validator: BatchValidator::new(&settings.planner),
            cycle_policy: settings.planner.cycle_policy,
            planner: PlanBuilder::new(&settings.planner, estimator.clone()),
            executor: BatchExecutor::new(&settings.executor, estimator),
        }
    }

    pub fn validate(&self, operations: &[BatchOperation]) -> ValidationReport {
        self.validator.validate(operations)
    }

    /// Validate and plan a batch without submitting anything
    pub fn plan(&self, operations: &[BatchOperation]) -> BatchResult<PlannedBatch> {
        let validation = self.validator.validate(operations);
        if !validation.valid {
            crate::metrics::record_batch_rejected("validation");
            return Err(BatchError::Validation {
                errors: validation.error_messages(),
            });
        }

        for warning in &validation.warnings {
            warn!("Batch warning: {}", warning);
        }

        let plan = self.sort_and_plan(operations).map_err(|e| {
            if matches!(e, BatchError::CyclicDependency { .. }) {
                crate::metrics::record_batch_rejected("cycle");
            }
            e
        })?;
        crate::metrics::record_batch_planned(&plan);

        Ok(PlannedBatch { validation, plan })
    }

    fn sort_and_plan(&self, operations: &[BatchOperation]) -> BatchResult<ExecutionPlan> {
        let sorted = sort_operations(operations, self.cycle_policy)?;
        let mut plan = self.planner.build_plan(&sorted.operations)?;

        if !sorted.dropped_edges.is_empty() {
            let mut anomalies: Vec<PlanAnomaly> = sorted
                .dropped_edges
                .into_iter()
                .map(PlanAnomaly::from)
                .collect();
            anomalies.append(&mut plan.anomalies);
            plan.anomalies = anomalies;
        }

        Ok(plan)
    }

    /// Plan and execute a batch through `submitter`.
    ///
    /// Validation and cycle errors return before any submission happens.
    pub async fn run<S>(
        &self,
        operations: &[BatchOperation],
        submitter: &S,
    ) -> BatchResult<BatchReport>
    where
        S: Submitter + ?Sized,
    {
        let PlannedBatch { validation, plan } = self.plan(operations)?;
        let savings = plan.savings();
        info!(
            "Executing {} operations in {} waves ({:.1}% gas saved)",
            plan.operation_count(),
            plan.waves.len(),
            savings.percent_saved
        );

        let result = self.executor.execute(&plan, submitter).await?;

        Ok(BatchReport {
            validation,
            plan,
            result,
        })
    }

    /// Plan and execute with simulated submissions
    pub async fn dry_run(&self, operations: &[BatchOperation]) -> BatchResult<BatchReport> {
        info!("Dry run: no operation will reach an external system");
        self.run(operations, &DryRunSubmitter::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{MockSubmitter, SubmissionOutcome, DRY_RUN_HANDLE_PREFIX};
    use alloy_primitives::U256;

    fn settings(policy: CyclePolicy) -> Settings {
        let mut settings = Settings::default();
        settings.planner.cycle_policy = policy;
        settings
    }

    #[tokio::test]
    async fn test_invalid_batch_never_reaches_submitter() {
        let ops = vec![BatchOperation::builder("self", "0x1").depends_on("self").build()];

        let mut submitter = MockSubmitter::new();
        submitter.expect_submit().never();

        let engine = BatchEngine::new(&Settings::default());
        let err = engine.run(&ops, &submitter).await.unwrap_err();
        match err {
            BatchError::Validation { errors } => {
                assert!(errors[0].contains("self dependency"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_submission() {
        let ops = vec![
            BatchOperation::builder("a", "0x1").depends_on("b").build(),
            BatchOperation::builder("b", "0x2").depends_on("a").build(),
        ];
        let mut submitter = MockSubmitter::new();
        submitter.expect_submit().never();

        let engine = BatchEngine::new(&settings(CyclePolicy::Reject));
        let err = engine.run(&ops, &submitter).await.unwrap_err();
        assert!(err.blocks_planning());
    }

    #[tokio::test]
    async fn test_drop_edge_policy_reports_anomalies() {
        let ops = vec![
            BatchOperation::builder("a", "0x1").depends_on("b").build(),
            BatchOperation::builder("b", "0x2").depends_on("a").build(),
        ];
        let engine = BatchEngine::new(&settings(CyclePolicy::DropEdge));
        let report = engine.dry_run(&ops).await.unwrap();

        assert_eq!(report.plan.anomalies.len(), 2);
        assert!(matches!(
            report.plan.anomalies[0],
            PlanAnomaly::DroppedEdge { .. }
        ));
        assert!(matches!(
            report.plan.anomalies[1],
            PlanAnomaly::ForcedProgress { .. }
        ));
        assert_eq!(report.result.executed, 2);
    }

    #[tokio::test]
    async fn test_dry_run_report() {
        let ops = vec![
            BatchOperation::builder("approve", "0xtoken").gas_limit(46_000).build(),
            BatchOperation::builder("deposit", "0xvault")
                .gas_limit(120_000)
                .depends_on("approve")
                .build(),
            BatchOperation::builder("claim", "0xrewards").gas_limit(80_000).build(),
        ];
        let engine =
            BatchEngine::with_pricer(&Settings::default(), Arc::new(|gas: u64| U256::from(gas)));
        let report = engine.dry_run(&ops).await.unwrap();

        assert!(report.validation.valid);
        assert_eq!(report.plan.waves.len(), 2);
        assert_eq!(report.plan.total_gas_before, 246_000);
        assert_eq!(report.plan.total_gas_after, 200_000);
        assert!(report.result.success);
        assert_eq!(report.result.total_cost, U256::from(246_000));
        assert!(report
            .result
            .outcomes
            .iter()
            .all(|o| o.result_handle.as_deref().unwrap().starts_with(DRY_RUN_HANDLE_PREFIX)));
    }

    #[tokio::test]
    async fn test_warnings_do_not_block() {
        let ops = vec![BatchOperation::builder("tiny", "0x1").gas_limit(21).build()];
        let mut submitter = MockSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| SubmissionOutcome::confirmed("0x1"));

        let engine = BatchEngine::new(&Settings::default());
        let report = engine.run(&ops, &submitter).await.unwrap();
        assert_eq!(report.validation.warnings.len(), 1);
        assert_eq!(report.result.executed, 1);
    }
}
