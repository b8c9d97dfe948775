//! Constraint propagation: per-task `[lb, ub)` windows.
//!
//! Each round the driver asks for a task's current bounds. Anchors pin
//! them, incoming dependency edges raise the lower bound, placed
//! successors and `onstart` mirrors lower the upper bound, and
//! `max_gap` edges add an upper bound on the start that can invalidate
//! an allocation candidate. An empty window is `Unsatisfiable`.

use crate::error::{Result, SchedulerError};
use crate::models::Direction;

use super::SchedulerContext;

/// The scheduling window of one task for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Earliest slot the task may occupy.
    pub lb: usize,
    /// Exclusive upper slot bound.
    pub ub: usize,
    /// Upper bound on the start slot from `max_gap` edges and
    /// start-to-start successors, if any.
    pub start_ub: Option<usize>,
}

/// Computes the current bounds of a leaf.
///
/// # Errors
/// `Unsatisfiable` when the window is empty (`lb > ub`).
pub fn bounds_for(ctx: &SchedulerContext, leaf: usize) -> Result<Bounds> {
    let task = &ctx.leaves[leaf];

    let mut lb = task.min_start.unwrap_or(0);
    if let Some(anchor) = task.start_anchor {
        lb = lb.max(anchor);
    }
    let mut ub = ctx.horizon();
    if let Some(anchor) = task.end_anchor {
        ub = ub.min(anchor);
    }
    if let Some(max_end) = task.max_end {
        ub = ub.min(max_end);
    }

    let mut start_ub: Option<usize> = None;
    let mut tighten_start_ub = |bound: usize| {
        start_ub = Some(start_ub.map_or(bound, |b| b.min(bound)));
    };

    // Incoming edges raise the lower bound once their source is placed
    for edge in &ctx.graph.incoming[leaf] {
        let Some(source) = ctx.placements[edge.source].as_ref() else {
            continue;
        };
        let anchor = if edge.from_source_start {
            source.start_slot
        } else {
            source.end_slot
        };
        lb = lb.max(anchor + edge.gap as usize);
        if let Some(max_gap) = edge.max_gap {
            tighten_start_ub(anchor + max_gap as usize);
        }
    }

    // Placed successors push the upper bound down: an end-to-start
    // edge bounds this task's end, a start-anchored edge its start
    for (target, edge) in &ctx.graph.outgoing[leaf] {
        let Some(target_placement) = ctx.placements[*target].as_ref() else {
            continue;
        };
        let bound = target_placement
            .start_slot
            .saturating_sub(edge.gap as usize);
        if edge.from_source_start {
            tighten_start_ub(bound);
        } else {
            ub = ub.min(bound);
        }
    }

    // ALAP mirror of `onstart`: with no end anchor, the task's end is
    // bounded by the source's start
    if task.direction == Direction::Alap && task.end_anchor.is_none() {
        for edge in &ctx.graph.incoming[leaf] {
            if !edge.onstart {
                continue;
            }
            if let Some(source) = ctx.placements[edge.source].as_ref() {
                ub = ub.min(source.start_slot.saturating_sub(edge.gap as usize));
            }
        }
    }

    if lb > ub {
        return Err(SchedulerError::Unsatisfiable {
            task_id: task.id.clone(),
            lb,
            ub,
        });
    }
    Ok(Bounds { lb, ub, start_ub })
}

/// Whether a leaf's hard predecessors are satisfied so the allocator
/// may place it.
///
/// ASAP: every incoming edge's source is placed. ALAP: an explicit end
/// anchor makes the task self-anchoring; otherwise every successor
/// must be placed (their starts bound our end) along with the sources
/// of `onstart` edges (their starts bound our end in the mirror case).
pub fn is_ready(ctx: &SchedulerContext, leaf: usize) -> bool {
    let task = &ctx.leaves[leaf];
    match task.direction {
        Direction::Asap => ctx.graph.incoming[leaf]
            .iter()
            .all(|edge| ctx.states.is_placed(edge.source)),
        Direction::Alap => {
            if task.end_anchor.is_some() {
                return true;
            }
            ctx.graph.incoming[leaf]
                .iter()
                .filter(|edge| edge.onstart)
                .all(|edge| ctx.states.is_placed(edge.source))
                && ctx.graph.outgoing[leaf]
                    .iter()
                    .all(|(target, _)| ctx.states.is_placed(*target))
        }
    }
}

/// Checks whether an existing placement still fits freshly computed
/// bounds. A stale placement is released and re-queued by the driver.
pub fn placement_within(ctx: &SchedulerContext, leaf: usize, bounds: &Bounds) -> bool {
    let Some(placement) = ctx.placements[leaf].as_ref() else {
        return true;
    };
    if placement.start_slot < bounds.lb {
        return false;
    }
    if let Some(start_ub) = bounds.start_ub {
        if placement.start_slot > start_ub {
            return false;
        }
    }
    if placement.end_slot == placement.start_slot {
        // Milestone: zero width, the single slot must sit inside
        placement.start_slot <= bounds.ub
    } else {
        placement.end_slot <= bounds.ub
    }
}

/// Final pass: every `max_gap` edge must hold on the frozen schedule.
///
/// For an edge with gap `g` and max gap `m`:
/// `anchor + g <= target.start <= anchor + m`.
pub fn validate_max_gaps(ctx: &SchedulerContext) -> Result<()> {
    for (leaf, edges) in ctx.graph.incoming.iter().enumerate() {
        let Some(placement) = ctx.placements[leaf].as_ref() else {
            continue;
        };
        for edge in edges {
            let Some(max_gap) = edge.max_gap else {
                continue;
            };
            let Some(source) = ctx.placements[edge.source].as_ref() else {
                continue;
            };
            let anchor = if edge.from_source_start {
                source.start_slot
            } else {
                source.end_slot
            };
            let upper = anchor + max_gap as usize;
            if placement.start_slot > upper {
                return Err(SchedulerError::Unsatisfiable {
                    task_id: ctx.leaves[leaf].id.clone(),
                    lb: anchor + edge.gap as usize,
                    ub: upper,
                });
            }
        }
    }
    Ok(())
}
