//! Wave-by-wave execution of a plan
//!
//! Waves run strictly in sequence order. Members of a parallel wave are
//! submitted together and awaited jointly, so no operation of wave n+1 starts
//! before every member of wave n is terminal. A failed required operation
//! skips everything not yet started; in-flight siblings are allowed to finish.

use super::planner::{ExecutionPlan, ExecutionWave};
use crate::batch::BatchOperation;
use crate::config::ExecutorConfig;
use crate::error::{BatchError, BatchResult};
use crate::tx::{GasEstimator, SubmissionOutcome, Submitter};

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of one operation during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Skipped,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Confirmed | OperationState::Failed | OperationState::Skipped
        )
    }

    pub fn can_transition_to(self, next: OperationState) -> bool {
        matches!(
            (self, next),
            (OperationState::Pending, OperationState::Submitted)
                | (OperationState::Pending, OperationState::Skipped)
                | (OperationState::Submitted, OperationState::Confirmed)
                | (OperationState::Submitted, OperationState::Failed)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Pending => "pending",
            OperationState::Submitted => "submitted",
            OperationState::Confirmed => "confirmed",
            OperationState::Failed => "failed",
            OperationState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Per-operation entry in the execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub id: String,
    pub state: OperationState,
    pub success: bool,
    pub result_handle: Option<String>,
    pub error: Option<String>,
    pub gas_used: Option<u64>,
    pub cost: Option<U256>,
}

impl OperationOutcome {
    fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: OperationState::Pending,
            success: false,
            result_handle: None,
            error: None,
            gas_used: None,
            cost: None,
        }
    }

    fn transition(&mut self, next: OperationState) -> BatchResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(BatchError::InvalidStateTransition {
                id: self.id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Aggregate report for one executed plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub batch_id: Uuid,
    /// True when no operation failed
    pub success: bool,
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_gas_used: u64,
    pub total_cost: U256,
    /// One entry per operation, in plan order
    pub outcomes: Vec<OperationOutcome>,
    /// Required operation whose failure aborted the batch
    pub aborted_by: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn outcome(&self, id: &str) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }
}

/// Result accumulator for one `execute` call
struct ResultLedger {
    entries: Vec<OperationOutcome>,
    positions: HashMap<String, usize>,
}

impl ResultLedger {
    fn new(plan: &ExecutionPlan) -> BatchResult<Self> {
        let mut entries = Vec::with_capacity(plan.operation_count());
        let mut positions = HashMap::with_capacity(plan.operation_count());

        for (position, wave) in plan.waves.iter().enumerate() {
            if wave.sequence_index != position {
                return Err(BatchError::Internal(format!(
                    "wave at position {} has sequence index {}",
                    position, wave.sequence_index
                )));
            }
        }

        for op in plan.operations() {
            if positions.insert(op.id.clone(), entries.len()).is_some() {
                return Err(BatchError::Internal(format!(
                    "operation {} appears more than once in the plan",
                    op.id
                )));
            }
            entries.push(OperationOutcome::pending(&op.id));
        }

        Ok(Self { entries, positions })
    }

    fn entry_mut(&mut self, id: &str) -> BatchResult<&mut OperationOutcome> {
        let pos = *self
            .positions
            .get(id)
            .ok_or_else(|| BatchError::UnknownOperation { id: id.to_string() })?;
        Ok(&mut self.entries[pos])
    }

    fn mark_submitted(&mut self, id: &str) -> BatchResult<()> {
        self.entry_mut(id)?.transition(OperationState::Submitted)
    }

    /// Record a submission result; returns whether the operation confirmed
    fn record(
        &mut self,
        op: &BatchOperation,
        outcome: SubmissionOutcome,
        estimator: &GasEstimator,
    ) -> BatchResult<bool> {
        let entry = self.entry_mut(&op.id)?;

        if outcome.success {
            entry.transition(OperationState::Confirmed)?;
            let gas_used = outcome.gas_used.unwrap_or(op.gas_limit);
            entry.success = true;
            entry.result_handle = outcome.handle;
            entry.gas_used = Some(gas_used);
            entry.cost = Some(estimator.calculate_cost(gas_used));
            debug!("Operation {} confirmed", op.id);
        } else {
            entry.transition(OperationState::Failed)?;
            let reason = outcome
                .error
                .unwrap_or_else(|| "submission failed without error detail".to_string());
            warn!(
                "Operation {} failed ({}): {}",
                op.id,
                if op.required { "required" } else { "optional" },
                reason
            );
            entry.error = Some(reason);
            entry.result_handle = outcome.handle;
        }

        crate::metrics::record_operation_outcome(entry.state);
        Ok(outcome.success)
    }

    /// Skip every operation that never started
    fn skip_pending(&mut self, aborted_by: &str) -> BatchResult<()> {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.state == OperationState::Pending)
        {
            entry.transition(OperationState::Skipped)?;
            entry.error = Some(format!("skipped: required operation {} failed", aborted_by));
            crate::metrics::record_operation_outcome(OperationState::Skipped);
        }
        Ok(())
    }

    fn finish(
        self,
        aborted_by: Option<String>,
        started_at: DateTime<Utc>,
    ) -> BatchResult<ExecutionResult> {
        let mut executed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut total_gas_used = 0u64;
        let mut total_cost = U256::ZERO;

        for entry in &self.entries {
            match entry.state {
                OperationState::Confirmed => {
                    executed += 1;
                    total_gas_used = total_gas_used.saturating_add(entry.gas_used.unwrap_or(0));
                    total_cost = total_cost.saturating_add(entry.cost.unwrap_or_default());
                }
                OperationState::Failed => failed += 1,
                OperationState::Skipped => skipped += 1,
                state => {
                    return Err(BatchError::Internal(format!(
                        "operation {} ended execution in non-terminal state {}",
                        entry.id, state
                    )));
                }
            }
        }

        Ok(ExecutionResult {
            batch_id: Uuid::new_v4(),
            success: failed == 0,
            executed,
            failed,
            skipped,
            total_gas_used,
            total_cost,
            outcomes: self.entries,
            aborted_by,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Executes plans against an injected submitter
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    estimator: GasEstimator,
    submission_timeout: Option<Duration>,
}

impl BatchExecutor {
    pub fn new(config: &ExecutorConfig, estimator: GasEstimator) -> Self {
        Self {
            estimator,
            submission_timeout: config.submission_timeout(),
        }
    }

    /// Execute a plan wave by wave.
    ///
    /// Submission failures are captured in the result. An `Err` means the plan
    /// itself was malformed: an operation listed twice, or waves whose
    /// sequence indices do not match their position.
    pub async fn execute<S>(
        &self,
        plan: &ExecutionPlan,
        submitter: &S,
    ) -> BatchResult<ExecutionResult>
    where
        S: Submitter + ?Sized,
    {
        let started_at = Utc::now();
        let ledger = Mutex::new(ResultLedger::new(plan)?);
        let mut aborted_by = None;

        for wave in &plan.waves {
            let timer = Instant::now();
            let abort = if wave.parallelizable {
                self.run_concurrent(wave, submitter, &ledger).await?
            } else {
                self.run_sequential(wave, submitter, &ledger).await?
            };
            crate::metrics::record_wave_executed(
                wave.parallelizable,
                timer.elapsed().as_secs_f64(),
            );

            if let Some(id) = abort {
                error!(
                    "Required operation {} failed in wave {}; skipping remaining operations",
                    id, wave.sequence_index
                );
                aborted_by = Some(id);
                break;
            }
        }

        let mut ledger = ledger.into_inner();
        if let Some(id) = &aborted_by {
            ledger.skip_pending(id)?;
        }

        let result = ledger.finish(aborted_by, started_at)?;
        info!(
            "Batch {} finished: {} executed, {} failed, {} skipped, {} gas",
            result.batch_id, result.executed, result.failed, result.skipped, result.total_gas_used
        );
        Ok(result)
    }

    /// Submit members one at a time; stops at the first required failure
    async fn run_sequential<S>(
        &self,
        wave: &ExecutionWave,
        submitter: &S,
        ledger: &Mutex<ResultLedger>,
    ) -> BatchResult<Option<String>>
    where
        S: Submitter + ?Sized,
    {
        for op in &wave.operations {
            ledger.lock().await.mark_submitted(&op.id)?;
            let outcome = self.submit_with_timeout(submitter, op).await;
            let confirmed = ledger.lock().await.record(op, outcome, &self.estimator)?;

            if !confirmed && op.required {
                return Ok(Some(op.id.clone()));
            }
        }
        Ok(None)
    }

    /// Submit all members together and wait for every one of them
    async fn run_concurrent<S>(
        &self,
        wave: &ExecutionWave,
        submitter: &S,
        ledger: &Mutex<ResultLedger>,
    ) -> BatchResult<Option<String>>
    where
        S: Submitter + ?Sized,
    {
        {
            let mut ledger = ledger.lock().await;
            for op in &wave.operations {
                ledger.mark_submitted(&op.id)?;
            }
        }

        let submissions = wave.operations.iter().map(|op| async move {
            let outcome = self.submit_with_timeout(submitter, op).await;
            let confirmed = ledger.lock().await.record(op, outcome, &self.estimator)?;
            Ok::<_, BatchError>((op, confirmed))
        });

        let mut abort = None;
        for completed in join_all(submissions).await {
            let (op, confirmed) = completed?;
            if !confirmed && op.required && abort.is_none() {
                abort = Some(op.id.clone());
            }
        }
        Ok(abort)
    }

    async fn submit_with_timeout<S>(&self, submitter: &S, op: &BatchOperation) -> SubmissionOutcome
    where
        S: Submitter + ?Sized,
    {
        debug!("Submitting {} to {}", op.id, op.target);

        let Some(limit) = self.submission_timeout else {
            return submitter.submit(op).await;
        };

        match timeout(limit, submitter.submit(op)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Submission of {} timed out after {:?}", op.id, limit);
                SubmissionOutcome::failed(format!(
                    "submission timed out after {}ms",
                    limit.as_millis()
                ))
            }
        }
    }
}
