//! Wave planning: group sorted operations into readiness waves
//!
//! A wave holds every operation whose dependencies finished in an earlier
//! wave, minus operations that would collide on a target with a wave member.
//! Colliding operations wait for a later wave even though no dependency
//! forces them to.

use super::dependency::{CyclePolicy, DroppedEdge};
use crate::batch::BatchOperation;
use crate::config::PlannerConfig;
use crate::error::{BatchError, BatchResult};
use crate::tx::{GasEstimator, GasSavings};

use alloy_primitives::U256;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Operations eligible to start together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionWave {
    pub sequence_index: usize,
    pub operations: Vec<BatchOperation>,
    pub parallelizable: bool,
    pub estimated_gas: u64,
}

impl ExecutionWave {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Something the planner had to do that the caller should know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanAnomaly {
    /// The sorter removed this edge to break a cycle
    DroppedEdge {
        dependent: String,
        dependency: String,
    },
    /// No operation was ready, so this one was scheduled alone
    ForcedProgress {
        operation_id: String,
        unresolved_dependencies: Vec<String>,
    },
}

impl From<DroppedEdge> for PlanAnomaly {
    fn from(edge: DroppedEdge) -> Self {
        PlanAnomaly::DroppedEdge {
            dependent: edge.dependent,
            dependency: edge.dependency,
        }
    }
}

/// Ordered waves plus batch-level gas and cost estimates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub waves: Vec<ExecutionWave>,
    /// Sum of every operation's gas limit
    pub total_gas_before: u64,
    /// Sum of wave estimates
    pub total_gas_after: u64,
    pub estimated_cost_before: U256,
    pub estimated_cost_after: U256,
    pub anomalies: Vec<PlanAnomaly>,
}

impl ExecutionPlan {
    pub fn operation_count(&self) -> usize {
        self.waves.iter().map(ExecutionWave::len).sum()
    }

    pub fn savings(&self) -> GasSavings {
        GasSavings::compute(self.total_gas_before, self.total_gas_after)
    }

    /// Sequence index of the wave containing `id`
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|wave| wave.operations.iter().any(|op| op.id == id))
            .map(|wave| wave.sequence_index)
    }

    pub fn operations(&self) -> impl Iterator<Item = &BatchOperation> {
        self.waves.iter().flat_map(|wave| wave.operations.iter())
    }
}

/// Builds execution plans from sorted operations
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    cycle_policy: CyclePolicy,
    max_wave_size: Option<usize>,
    estimator: GasEstimator,
}

impl PlanBuilder {
    pub fn new(config: &PlannerConfig, estimator: GasEstimator) -> Self {
        Self {
            cycle_policy: config.cycle_policy,
            max_wave_size: config.max_wave_size,
            estimator,
        }
    }

    /// Build a plan from operations in dependency-respecting order.
    ///
    /// Planning is deterministic: the same input always yields the same plan.
    pub fn build_plan(&self, ordered: &[BatchOperation]) -> BatchResult<ExecutionPlan> {
        let n = ordered.len();
        let index: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, op)| (op.id.as_str(), i))
            .collect();

        let deps = ordered
            .iter()
            .map(|op| {
                op.dependencies
                    .iter()
                    .map(|dep| {
                        index
                            .get(dep.as_str())
                            .copied()
                            .ok_or_else(|| BatchError::UnknownOperation { id: dep.clone() })
                    })
                    .collect::<BatchResult<Vec<usize>>>()
            })
            .collect::<BatchResult<Vec<_>>>()?;

        let mut done = vec![false; n];
        let mut remaining = n;
        let mut waves = Vec::new();
        let mut anomalies = Vec::new();

        while remaining > 0 {
            let ready: Vec<usize> = (0..n)
                .filter(|&i| !done[i] && deps[i].iter().all(|&d| done[d]))
                .collect();

            let members = if ready.is_empty() {
                vec![self.force_progress(ordered, &deps, &done, &mut anomalies)?]
            } else {
                self.select_members(ordered, &ready)
            };

            for &i in &members {
                done[i] = true;
            }
            remaining -= members.len();

            let wave = self.make_wave(waves.len(), ordered, &members, &deps);
            debug!(
                "Wave {}: {} operations, parallel={}, gas={}",
                wave.sequence_index,
                wave.len(),
                wave.parallelizable,
                wave.estimated_gas
            );
            waves.push(wave);
        }

        let total_gas_before = self.estimator.total_gas(ordered);
        let total_gas_after = waves
            .iter()
            .fold(0u64, |acc, wave| acc.saturating_add(wave.estimated_gas));

        let plan = ExecutionPlan {
            estimated_cost_before: self.estimator.calculate_cost(total_gas_before),
            estimated_cost_after: self.estimator.calculate_cost(total_gas_after),
            waves,
            total_gas_before,
            total_gas_after,
            anomalies,
        };

        info!(
            "Planned {} operations in {} waves (gas {} -> {})",
            n,
            plan.waves.len(),
            plan.total_gas_before,
            plan.total_gas_after
        );

        Ok(plan)
    }

    /// Pick at most one ready operation per target, then apply the size cap.
    ///
    /// On a target collision the higher priority wins; equal priorities keep
    /// the earlier operation in sorted order.
    fn select_members(&self, ordered: &[BatchOperation], ready: &[usize]) -> Vec<usize> {
        let mut by_target: HashMap<&str, usize> = HashMap::new();

        for &i in ready {
            let op = &ordered[i];
            match by_target.get(op.target.as_str()) {
                Some(&held) if ordered[held].priority >= op.priority => {}
                _ => {
                    by_target.insert(op.target.as_str(), i);
                }
            }
        }

        let mut members: Vec<usize> = by_target.into_values().collect();
        members.sort_unstable();

        if let Some(cap) = self.max_wave_size {
            members.truncate(cap.max(1));
        }

        members
    }

    /// Schedule the first unassigned operation alone, or fail under `Reject`
    fn force_progress(
        &self,
        ordered: &[BatchOperation],
        deps: &[Vec<usize>],
        done: &[bool],
        anomalies: &mut Vec<PlanAnomaly>,
    ) -> BatchResult<usize> {
        let next = done
            .iter()
            .position(|&d| !d)
            .ok_or_else(|| BatchError::Internal("no unassigned operation left".to_string()))?;

        let unresolved: Vec<String> = deps[next]
            .iter()
            .filter(|&&d| !done[d])
            .map(|&d| ordered[d].id.clone())
            .collect();

        match self.cycle_policy {
            CyclePolicy::Reject => {
                let cycle = std::iter::once(ordered[next].id.clone())
                    .chain(unresolved)
                    .collect();
                Err(BatchError::CyclicDependency { cycle })
            }
            CyclePolicy::DropEdge => {
                warn!(
                    "No operation ready; forcing {} ahead of {:?}",
                    ordered[next].id, unresolved
                );
                anomalies.push(PlanAnomaly::ForcedProgress {
                    operation_id: ordered[next].id.clone(),
                    unresolved_dependencies: unresolved,
                });
                Ok(next)
            }
        }
    }

    fn make_wave(
        &self,
        sequence_index: usize,
        ordered: &[BatchOperation],
        members: &[usize],
        deps: &[Vec<usize>],
    ) -> ExecutionWave {
        let mut targets = HashSet::with_capacity(members.len());
        let distinct_targets = members
            .iter()
            .all(|&i| targets.insert(ordered[i].target.as_str()));
        let independent = members
            .iter()
            .all(|&i| deps[i].iter().all(|d| !members.contains(d)));
        let parallelizable = members.len() > 1 && distinct_targets && independent;

        let operations: Vec<BatchOperation> =
            members.iter().map(|&i| ordered[i].clone()).collect();
        let estimated_gas = self.estimator.estimate_wave_gas(&operations, parallelizable);

        ExecutionWave {
            sequence_index,
            operations,
            parallelizable,
            estimated_gas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Priority;
    use crate::coordination::sort_operations;
    use crate::tx::FixedGasPrice;
    use std::sync::Arc;

    fn builder(config: PlannerConfig) -> PlanBuilder {
        PlanBuilder::new(
            &config,
            GasEstimator::new(Arc::new(FixedGasPrice::new(10))),
        )
    }

    fn op(id: &str, target: &str, gas: u64, deps: &[&str]) -> BatchOperation {
        let mut b = BatchOperation::builder(id, target).gas_limit(gas);
        for dep in deps {
            b = b.depends_on(*dep);
        }
        b.build()
    }

    fn wave_ids(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
        plan.waves
            .iter()
            .map(|w| w.operations.iter().map(|op| op.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_independent_distinct_targets_share_a_wave() {
        let ops = vec![
            op("a", "0x1", 50_000, &[]),
            op("b", "0x2", 70_000, &[]),
            op("c", "0x3", 30_000, &["a", "b"]),
        ];
        let plan = builder(PlannerConfig::default()).build_plan(&ops).unwrap();

        assert_eq!(wave_ids(&plan), vec![vec!["a", "b"], vec!["c"]]);
        assert!(plan.waves[0].parallelizable);
        assert_eq!(plan.waves[0].estimated_gas, 70_000);
        assert!(!plan.waves[1].parallelizable);
        assert_eq!(plan.total_gas_before, 150_000);
        assert_eq!(plan.total_gas_after, 100_000);
        assert_eq!(plan.estimated_cost_before, U256::from(1_500_000));
        assert_eq!(plan.estimated_cost_after, U256::from(1_000_000));
        assert_eq!(plan.savings().gas_saved, 50_000);
    }

    #[test]
    fn test_shared_target_waits_for_next_wave() {
        let ops = vec![
            op("a", "0xpool", 40_000, &[]),
            op("b", "0xpool", 40_000, &[]),
            op("c", "0xother", 40_000, &[]),
        ];
        let plan = builder(PlannerConfig::default()).build_plan(&ops).unwrap();

        assert_eq!(wave_ids(&plan), vec![vec!["a", "c"], vec!["b"]]);
        for wave in plan.waves.iter().filter(|w| w.parallelizable) {
            let targets: HashSet<_> = wave.operations.iter().map(|op| &op.target).collect();
            assert_eq!(targets.len(), wave.len());
        }
    }

    #[test]
    fn test_priority_breaks_target_ties() {
        let ops = vec![
            BatchOperation::builder("low", "0xpool")
                .priority(Priority::Low)
                .build(),
            BatchOperation::builder("high", "0xpool")
                .priority(Priority::High)
                .build(),
        ];
        let plan = builder(PlannerConfig::default()).build_plan(&ops).unwrap();
        assert_eq!(wave_ids(&plan), vec![vec!["high"], vec!["low"]]);
    }

    #[test]
    fn test_chain_is_fully_sequential() {
        let ops = vec![
            op("a", "0x1", 30_000, &[]),
            op("b", "0x2", 30_000, &["a"]),
            op("c", "0x3", 30_000, &["b"]),
        ];
        let plan = builder(PlannerConfig::default()).build_plan(&ops).unwrap();

        assert_eq!(plan.waves.len(), 3);
        assert!(plan.waves.iter().all(|w| !w.parallelizable));
        assert_eq!(plan.total_gas_before, plan.total_gas_after);
        assert_eq!(plan.wave_of("c"), Some(2));
    }

    #[test]
    fn test_wave_size_cap() {
        let ops: Vec<_> = (0..5)
            .map(|i| op(&format!("op-{}", i), &format!("0x{}", i), 21_000, &[]))
            .collect();
        let config = PlannerConfig {
            max_wave_size: Some(2),
            ..Default::default()
        };
        let plan = builder(config).build_plan(&ops).unwrap();

        assert_eq!(
            wave_ids(&plan),
            vec![vec!["op-0", "op-1"], vec!["op-2", "op-3"], vec!["op-4"]]
        );
        assert_eq!(plan.operation_count(), 5);
    }

    #[test]
    fn test_cycle_rejected_under_reject_policy() {
        let ops = vec![op("a", "0x1", 21_000, &["b"]), op("b", "0x2", 21_000, &["a"])];
        let err = builder(PlannerConfig::default()).build_plan(&ops).unwrap_err();
        assert!(matches!(err, BatchError::CyclicDependency { .. }));
    }

    #[test]
    fn test_cycle_forces_progress_under_drop_edge_policy() {
        let ops = vec![op("a", "0x1", 21_000, &["b"]), op("b", "0x2", 21_000, &["a"])];
        let config = PlannerConfig {
            cycle_policy: CyclePolicy::DropEdge,
            ..Default::default()
        };
        let sorted = sort_operations(&ops, CyclePolicy::DropEdge).unwrap();
        let plan = builder(config).build_plan(&sorted.operations).unwrap();

        assert_eq!(wave_ids(&plan), vec![vec!["b"], vec!["a"]]);
        assert_eq!(
            plan.anomalies,
            vec![PlanAnomaly::ForcedProgress {
                operation_id: "b".into(),
                unresolved_dependencies: vec!["a".into()],
            }]
        );
    }

    #[test]
    fn test_planning_is_deterministic() {
        let ops = vec![
            op("a", "0x1", 50_000, &[]),
            op("b", "0x1", 60_000, &[]),
            op("c", "0x2", 70_000, &["a"]),
            op("d", "0x3", 80_000, &[]),
        ];
        let planner = builder(PlannerConfig::default());
        let first = planner.build_plan(&ops).unwrap();
        let second = planner.build_plan(&ops).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_batch() {
        let plan = builder(PlannerConfig::default()).build_plan(&[]).unwrap();
        assert!(plan.waves.is_empty());
        assert_eq!(plan.total_gas_after, 0);
    }
}
