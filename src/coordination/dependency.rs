//! Dependency graph and topological ordering of batch operations
//!
//! Operations are stored in an arena indexed by their position in the input,
//! and edges point from a dependent to the operations it waits on. Ordering
//! is a depth-first post-order walk with explicit three-colour marking.

use crate::batch::BatchOperation;
use crate::error::{BatchError, BatchResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How to treat a dependency cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Fail the whole batch
    #[default]
    Reject,
    /// Drop the edge that closes the cycle, record it, and continue
    DropEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Edge removed to break a cycle: `dependent` no longer waits on `dependency`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedEdge {
    pub dependent: String,
    pub dependency: String,
}

/// Arena indices in dependency-respecting order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologicalOrder {
    pub order: Vec<usize>,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Operations in dependency-respecting order
#[derive(Debug, Clone, Default)]
pub struct SortedBatch {
    pub operations: Vec<BatchOperation>,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Dependency graph over a borrowed batch
pub struct DependencyGraph<'a> {
    operations: &'a [BatchOperation],
    /// edges[i]: indices operation i depends on, in declared order
    edges: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, resolving every dependency id to an arena index
    pub fn build(operations: &'a [BatchOperation]) -> BatchResult<Self> {
        let mut index = HashMap::with_capacity(operations.len());
        for (i, op) in operations.iter().enumerate() {
            if index.insert(op.id.as_str(), i).is_some() {
                return Err(BatchError::Validation {
                    errors: vec![format!("duplicate operation id: {}", op.id)],
                });
            }
        }

        let edges = operations
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
                    .collect::<BatchResult<Vec<_>>>()
            })
            .collect::<BatchResult<Vec<_>>>()?;

        Ok(Self { operations, edges })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Indices the operation at `node` depends on
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.edges[node]
    }

    /// Compute a topological order.
    ///
    /// Roots are visited in input order and dependencies in declared order,
    /// so an input that already respects its dependencies comes back unchanged.
    pub fn topological_order(&self, policy: CyclePolicy) -> BatchResult<TopologicalOrder> {
        let n = self.operations.len();
        let mut marks = vec![Mark::Unvisited; n];
        let mut order = Vec::with_capacity(n);
        let mut dropped_edges = Vec::new();

        for root in 0..n {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (node, next edge to follow)
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::InProgress;

            while let Some(&(node, cursor)) = stack.last() {
                let Some(&dep) = self.edges[node].get(cursor) else {
                    marks[node] = Mark::Done;
                    order.push(node);
                    stack.pop();
                    continue;
                };

                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }

                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::InProgress => {
                        let cycle = self.cycle_path(&stack, dep);
                        match policy {
                            CyclePolicy::Reject => {
                                warn!("Rejecting batch with cycle: {}", cycle.join(" -> "));
                                return Err(BatchError::CyclicDependency { cycle });
                            }
                            CyclePolicy::DropEdge => {
                                warn!(
                                    "Dropping dependency {} -> {} to break cycle {}",
                                    self.operations[node].id,
                                    self.operations[dep].id,
                                    cycle.join(" -> ")
                                );
                                dropped_edges.push(DroppedEdge {
                                    dependent: self.operations[node].id.clone(),
                                    dependency: self.operations[dep].id.clone(),
                                });
                            }
                        }
                    }
                    Mark::Done => {}
                }
            }
        }

        debug!(
            "Sorted {} operations ({} edges dropped)",
            order.len(),
            dropped_edges.len()
        );

        Ok(TopologicalOrder {
            order,
            dropped_edges,
        })
    }

    /// Ids along the DFS stack from `back_to` to the top, closed with `back_to`
    fn cycle_path(&self, stack: &[(usize, usize)], back_to: usize) -> Vec<String> {
        let start = stack
            .iter()
            .position(|&(node, _)| node == back_to)
            .unwrap_or(0);

        stack[start..]
            .iter()
            .map(|&(node, _)| self.operations[node].id.clone())
            .chain(std::iter::once(self.operations[back_to].id.clone()))
            .collect()
    }
}

/// Sort operations so that every dependency precedes its dependents
pub fn sort_operations(
    operations: &[BatchOperation],
    policy: CyclePolicy,
) -> BatchResult<SortedBatch> {
    let graph = DependencyGraph::build(operations)?;
    let TopologicalOrder {
        order,
        dropped_edges,
    } = graph.topological_order(policy)?;

    Ok(SortedBatch {
        operations: order.into_iter().map(|i| operations[i].clone()).collect(),
        dropped_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str, deps: &[&str]) -> BatchOperation {
        let mut builder = BatchOperation::builder(id, format!("0x{}", id));
        for dep in deps {
            builder = builder.depends_on(*dep);
        }
        builder.build()
    }

    fn ids(sorted: &SortedBatch) -> Vec<&str> {
        sorted.operations.iter().map(|op| op.id.as_str()).collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let ops = vec![op("c", &["b"]), op("b", &["a"]), op("a", &[])];
        let sorted = sort_operations(&ops, CyclePolicy::Reject).unwrap();
        assert_eq!(ids(&sorted), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_operations_keep_input_order() {
        let ops = vec![op("x", &[]), op("y", &[]), op("z", &[])];
        let sorted = sort_operations(&ops, CyclePolicy::Reject).unwrap();
        assert_eq!(ids(&sorted), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_consistent_input_is_unchanged() {
        let ops = vec![
            op("a", &[]),
            op("b", &[]),
            op("c", &["a"]),
            op("d", &["b", "c"]),
        ];
        let sorted = sort_operations(&ops, CyclePolicy::Reject).unwrap();
        assert_eq!(ids(&sorted), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_diamond_emits_each_node_once() {
        let ops = vec![
            op("d", &["b", "c"]),
            op("b", &["a"]),
            op("c", &["a"]),
            op("a", &[]),
        ];
        let sorted = sort_operations(&ops, CyclePolicy::Reject).unwrap();
        assert_eq!(ids(&sorted), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_reject_cycle() {
        let ops = vec![op("a", &["b"]), op("b", &["c"]), op("c", &["a"])];
        let err = sort_operations(&ops, CyclePolicy::Reject).unwrap_err();
        match err {
            BatchError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_drop_edge_breaks_cycle() {
        let ops = vec![op("a", &["b"]), op("b", &["a"])];
        let sorted = sort_operations(&ops, CyclePolicy::DropEdge).unwrap();
        assert_eq!(ids(&sorted), vec!["b", "a"]);
        assert_eq!(
            sorted.dropped_edges,
            vec![DroppedEdge {
                dependent: "b".into(),
                dependency: "a".into(),
            }]
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let ops = vec![op("s", &["s"])];
        assert!(matches!(
            sort_operations(&ops, CyclePolicy::Reject),
            Err(BatchError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let ops = vec![op("a", &["ghost"])];
        assert!(matches!(
            DependencyGraph::build(&ops),
            Err(BatchError::UnknownOperation { id }) if id == "ghost"
        ));
    }

    #[test]
    fn test_graph_indices() {
        let ops = vec![op("a", &[]), op("b", &["a"])];
        let graph = DependencyGraph::build(&ops).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependencies(1), &[0]);
    }
}
