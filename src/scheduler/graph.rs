//! Dependency graph over leaf tasks.
//!
//! Resolves the declared dependency surface into a uniform edge list:
//! `precedes` edges are inverted into `depends` form, edges on
//! container tasks are inherited by their leaf descendants, and edges
//! *from* container tasks are expanded to every leaf under the
//! container. The result is a DAG over leaves with a topological order
//! (and its reverse) used for visit ordering and readiness checks.
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4

use std::collections::HashMap;

use crate::error::{Result, SchedulerError};
use crate::models::{DependencyEdge, Project};

/// A dependency edge after inversion and container expansion.
///
/// `source` is a leaf index. `from_source_start` selects the source
/// anchor (start instead of end); `onstart` additionally carries the
/// ALAP end-bound semantics of the original flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEdge {
    /// Leaf index of the source task.
    pub source: usize,
    /// Minimum gap in slots.
    pub gap: u64,
    /// Optional maximum gap in slots.
    pub max_gap: Option<u64>,
    /// Measure from the source's start rather than its end.
    pub from_source_start: bool,
    /// The edge carried an explicit `onstart` flag.
    pub onstart: bool,
}

/// The resolved dependency graph of a project.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Leaf task ids, in declaration order. Indices into this list are
    /// the leaf indices used everywhere in the engine.
    pub leaf_ids: Vec<String>,
    index: HashMap<String, usize>,
    /// Incoming edges per leaf.
    pub incoming: Vec<Vec<ResolvedEdge>>,
    /// Outgoing edges per leaf: `(target, edge)` pairs where `edge`
    /// still names this leaf as source.
    pub outgoing: Vec<Vec<(usize, ResolvedEdge)>>,
    /// Topological order of leaf indices.
    pub topo_order: Vec<usize>,
    /// Rank of each leaf in the topological order.
    pub topo_rank: Vec<usize>,
}

impl DependencyGraph {
    /// Builds the graph for a project.
    ///
    /// # Errors
    /// `InvalidModel` for edges naming unknown tasks,
    /// `CycleDetected` if the resolved graph has a cycle.
    pub fn build(project: &Project) -> Result<Self> {
        let leaf_ids: Vec<String> = project
            .tasks
            .iter()
            .filter(|t| project.is_leaf_task(&t.id))
            .map(|t| t.id.clone())
            .collect();
        let index: HashMap<String, usize> = leaf_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut incoming: Vec<Vec<ResolvedEdge>> = vec![Vec::new(); leaf_ids.len()];

        // Own and inherited `depends` edges. A leaf inherits every
        // edge declared on its ancestor containers.
        for (leaf_idx, leaf_id) in leaf_ids.iter().enumerate() {
            let mut current = Some(leaf_id.as_str());
            while let Some(id) = current {
                let task = project.task(id).ok_or_else(|| SchedulerError::InvalidModel {
                    reason: format!("task '{id}' not found while resolving dependencies"),
                })?;
                for edge in &task.depends {
                    push_expanded(project, &index, &mut incoming, leaf_idx, edge)?;
                }
                current = task.parent.as_deref();
            }
        }

        // `precedes` edges invert into `depends` on the named task;
        // container targets expand to their leaves.
        for task in &project.tasks {
            for edge in &task.precedes {
                let inverted = DependencyEdge {
                    source: task.id.clone(),
                    kind: edge.kind,
                    gap: edge.gap,
                    max_gap: edge.max_gap,
                    onstart: edge.onstart,
                };
                for target_leaf in leaves_under(project, &index, &edge.source)? {
                    push_expanded(project, &index, &mut incoming, target_leaf, &inverted)?;
                }
            }
        }

        let mut outgoing: Vec<Vec<(usize, ResolvedEdge)>> = vec![Vec::new(); leaf_ids.len()];
        for (target, edges) in incoming.iter().enumerate() {
            for edge in edges {
                outgoing[edge.source].push((target, *edge));
            }
        }

        let topo_order = topological_order(&leaf_ids, &incoming)?;
        let mut topo_rank = vec![0usize; leaf_ids.len()];
        for (rank, &leaf) in topo_order.iter().enumerate() {
            topo_rank[leaf] = rank;
        }

        Ok(Self {
            leaf_ids,
            index,
            incoming,
            outgoing,
            topo_order,
            topo_rank,
        })
    }

    /// Leaf index of a task id.
    pub fn leaf_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaf_ids.len()
    }

    /// Whether the graph has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaf_ids.is_empty()
    }

    /// The topological order reversed (for ALAP passes).
    pub fn reverse_topo_order(&self) -> Vec<usize> {
        self.topo_order.iter().rev().copied().collect()
    }
}

/// Adds `edge` to `target_leaf`, expanding a container source into all
/// its leaf descendants.
fn push_expanded(
    project: &Project,
    index: &HashMap<String, usize>,
    incoming: &mut [Vec<ResolvedEdge>],
    target_leaf: usize,
    edge: &DependencyEdge,
) -> Result<()> {
    for source_leaf in leaves_under(project, index, &edge.source)? {
        let resolved = ResolvedEdge {
            source: source_leaf,
            gap: edge.gap,
            max_gap: edge.max_gap,
            from_source_start: edge.from_source_start(),
            onstart: edge.onstart,
        };
        if !incoming[target_leaf].contains(&resolved) {
            incoming[target_leaf].push(resolved);
        }
    }
    Ok(())
}

/// Leaf indices under a task id: the id itself if it is a leaf, else
/// all leaf descendants in declaration order.
fn leaves_under(
    project: &Project,
    index: &HashMap<String, usize>,
    id: &str,
) -> Result<Vec<usize>> {
    if project.task(id).is_none() {
        return Err(SchedulerError::InvalidModel {
            reason: format!("dependency references unknown task '{id}'"),
        });
    }
    if let Some(&leaf) = index.get(id) {
        return Ok(vec![leaf]);
    }
    let mut leaves = Vec::new();
    let mut stack: Vec<&str> = vec![id];
    while let Some(current) = stack.pop() {
        for child in project.task_children(current) {
            if let Some(&leaf) = index.get(child.id.as_str()) {
                leaves.push(leaf);
            } else {
                stack.push(&child.id);
            }
        }
    }
    leaves.sort_unstable();
    Ok(leaves)
}

/// Kahn's algorithm with declaration-order tie-breaking.
fn topological_order(
    leaf_ids: &[String],
    incoming: &[Vec<ResolvedEdge>],
) -> Result<Vec<usize>> {
    let n = leaf_ids.len();
    let mut indegree: Vec<usize> = incoming.iter().map(Vec::len).collect();
    let mut done = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while order.len() < n {
        // Lowest declaration index with no unsatisfied predecessors;
        // linear scan keeps the order deterministic
        let next = (0..n).find(|&i| !done[i] && indegree[i] == 0);
        let Some(next) = next else {
            let culprit = (0..n)
                .find(|&i| !done[i])
                .map(|i| leaf_ids[i].clone())
                .unwrap_or_default();
            return Err(SchedulerError::CycleDetected { task_id: culprit });
        };
        done[next] = true;
        order.push(next);
        for (target, edges) in incoming.iter().enumerate() {
            if !done[target] {
                for edge in edges {
                    if edge.source == next {
                        indegree[target] -= 1;
                    }
                }
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencyKind, Task};
    use chrono::{TimeZone, Utc};

    fn make_project(tasks: Vec<Task>) -> Project {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut p = Project::new("p", start, end);
        for t in tasks {
            p = p.with_task(t);
        }
        p
    }

    #[test]
    fn test_simple_chain() {
        let p = make_project(vec![
            Task::new("a").with_effort(1),
            Task::new("b").with_effort(1).depends_on("a"),
            Task::new("c").with_effort(1).depends_on("b"),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        assert_eq!(g.topo_order, vec![0, 1, 2]);
        assert_eq!(g.reverse_topo_order(), vec![2, 1, 0]);
        assert_eq!(g.incoming[1][0].source, 0);
        assert_eq!(g.outgoing[0][0].0, 1);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let p = make_project(vec![
            Task::new("z").with_effort(1),
            Task::new("a").with_effort(1),
            Task::new("m").with_effort(1).depends_on("z"),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        // z and a are both ready first; declaration order wins
        assert_eq!(g.topo_order, vec![0, 1, 2]);
    }

    #[test]
    fn test_precedes_inverts() {
        let p = make_project(vec![
            Task::new("a")
                .with_effort(1)
                .with_precedes(DependencyEdge::new("b").with_gap(2)),
            Task::new("b").with_effort(1),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        let b = g.leaf_index("b").unwrap();
        let a = g.leaf_index("a").unwrap();
        assert_eq!(g.incoming[b].len(), 1);
        assert_eq!(g.incoming[b][0].source, a);
        assert_eq!(g.incoming[b][0].gap, 2);
        assert_eq!(g.topo_order, vec![a, b]);
    }

    #[test]
    fn test_container_source_expands_to_leaves() {
        let p = make_project(vec![
            Task::new("phase"),
            Task::new("x").with_parent("phase").with_effort(1),
            Task::new("y").with_parent("phase").with_effort(1),
            Task::new("after").with_effort(1).depends_on("phase"),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        let after = g.leaf_index("after").unwrap();
        let sources: Vec<usize> = g.incoming[after].iter().map(|e| e.source).collect();
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&g.leaf_index("x").unwrap()));
        assert!(sources.contains(&g.leaf_index("y").unwrap()));
    }

    #[test]
    fn test_children_inherit_container_dependencies() {
        let p = make_project(vec![
            Task::new("spec").with_effort(1),
            Task::new("software").depends_on("spec"),
            Task::new("gui").with_parent("software").with_effort(1),
            Task::new("backend").with_parent("software").with_effort(1),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        let spec = g.leaf_index("spec").unwrap();
        for id in ["gui", "backend"] {
            let leaf = g.leaf_index(id).unwrap();
            assert!(g.incoming[leaf].iter().any(|e| e.source == spec));
        }
    }

    #[test]
    fn test_cycle_detected() {
        let p = make_project(vec![
            Task::new("a").with_effort(1).depends_on("b"),
            Task::new("b").with_effort(1).depends_on("a"),
        ]);
        match DependencyGraph::build(&p) {
            Err(SchedulerError::CycleDetected { task_id }) => {
                assert!(task_id == "a" || task_id == "b");
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let p = make_project(vec![Task::new("a").with_effort(1).depends_on("ghost")]);
        assert!(matches!(
            DependencyGraph::build(&p),
            Err(SchedulerError::InvalidModel { .. })
        ));
    }

    #[test]
    fn test_start_to_start_flag_survives() {
        let p = make_project(vec![
            Task::new("a").with_effort(1),
            Task::new("b").with_effort(1).with_dependency(
                DependencyEdge::new("a").with_kind(DependencyKind::StartToStart),
            ),
        ]);
        let g = DependencyGraph::build(&p).unwrap();
        let b = g.leaf_index("b").unwrap();
        assert!(g.incoming[b][0].from_source_start);
        assert!(!g.incoming[b][0].onstart);
    }
}
