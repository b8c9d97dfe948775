//! The fixed-point driver.
//!
//! Runs allocation rounds until no task changes state: each round
//! visits unplaced tasks in (priority desc, topological order asc,
//! declaration order asc), computes bounds, places Ready tasks, and
//! then re-validates existing placements whose bounds may have moved
//! (preemption and alternative resolution can cascade). The round cap
//! is `2 x |tasks|`; exceeding it raises `Nonconvergent`. A round with
//! unplaced tasks and no progress is a dependency deadlock, reported
//! as `Unsatisfiable`.
//!
//! Pre-passes before the first round, in order: container anchors
//! propagate to leaf descendants, then ALAP mode propagates backward
//! through dependency chains feeding an ALAP-anchored task.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{Result, SchedulerError};
use crate::models::{
    Direction, Project, ResourceUsage, Schedule, SlotRange, TaskSchedule, TimezoneResolver,
};
use crate::validation;

use super::{allocator, constraint, SchedulerContext, SlotState, TaskState};

/// One scheduling run over a project.
pub struct Driver<'a> {
    project: &'a Project,
    ctx: SchedulerContext,
    visit_order: Vec<usize>,
}

impl<'a> Driver<'a> {
    /// Validates the model and builds the run context.
    pub fn new(project: &'a Project, resolver: &dyn TimezoneResolver) -> Result<Self> {
        if let Err(errors) = validation::validate_project(project) {
            return Err(SchedulerError::InvalidModel {
                reason: errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_default(),
            });
        }

        let mut ctx = SchedulerContext::new(project, resolver)?;
        propagate_container_anchors(project, &mut ctx);
        propagate_alap(&mut ctx);

        // Visit order: priority desc, topological rank asc,
        // declaration order asc. Leaf indices are declaration order.
        let mut visit_order: Vec<usize> = (0..ctx.leaves.len()).collect();
        visit_order.sort_by_key(|&leaf| {
            (
                -(ctx.leaves[leaf].priority as i64),
                ctx.graph.topo_rank[leaf],
                leaf,
            )
        });

        Ok(Self {
            project,
            ctx,
            visit_order,
        })
    }

    /// Runs rounds to the fixed point and assembles the schedule.
    pub fn run(mut self) -> Result<Schedule> {
        let n = self.ctx.leaves.len();
        let round_cap = 2 * n.max(1);
        let mut rounds = 0usize;

        loop {
            let mut changed = false;

            for i in 0..self.visit_order.len() {
                let leaf = self.visit_order[i];
                if self.ctx.states.get(leaf) == TaskState::Unscheduled
                    && constraint::is_ready(&self.ctx, leaf)
                {
                    self.ctx.states.mark_ready(leaf);
                    changed = true;
                }
                if self.ctx.states.get(leaf) != TaskState::Ready {
                    continue;
                }

                let bounds = match constraint::bounds_for(&self.ctx, leaf) {
                    Ok(b) => b,
                    Err(e) => {
                        self.ctx.states.mark_failed(leaf);
                        return Err(e);
                    }
                };
                let result = match allocator::place(&self.ctx, leaf, &bounds) {
                    Ok(r) => r,
                    Err(e) => {
                        self.ctx.states.mark_failed(leaf);
                        return Err(e);
                    }
                };
                for victim in result.victims {
                    debug!(
                        victim = %self.ctx.leaves[victim].id,
                        by = %self.ctx.leaves[leaf].id,
                        "booking evicted"
                    );
                    self.ctx.release(victim);
                    if !self.ctx.states.requeue(victim) {
                        return Err(SchedulerError::Nonconvergent { rounds });
                    }
                }
                self.ctx.commit(leaf, result.placement);
                self.ctx.states.mark_placed(leaf);
                changed = true;
            }

            // Re-validate placements whose bounds may have moved
            for leaf in 0..n {
                if self.ctx.states.get(leaf) != TaskState::Placed {
                    continue;
                }
                let bounds = constraint::bounds_for(&self.ctx, leaf)?;
                if !constraint::placement_within(&self.ctx, leaf, &bounds) {
                    debug!(task = %self.ctx.leaves[leaf].id, "bounds moved, re-queueing");
                    self.ctx.release(leaf);
                    if !self.ctx.states.requeue(leaf) {
                        return Err(SchedulerError::Nonconvergent { rounds });
                    }
                    changed = true;
                }
            }

            if !changed {
                let unplaced = self.ctx.states.unplaced();
                if let Some(&first) = unplaced.first() {
                    // No failure, no progress: dependency deadlock
                    let bounds = constraint::bounds_for(&self.ctx, first)?;
                    return Err(SchedulerError::Unsatisfiable {
                        task_id: self.ctx.leaves[first].id.clone(),
                        lb: bounds.lb,
                        ub: bounds.ub,
                    });
                }
                break;
            }

            rounds += 1;
            if rounds > round_cap {
                return Err(SchedulerError::Nonconvergent { rounds });
            }
        }

        self.ctx.states.freeze_all();
        constraint::validate_max_gaps(&self.ctx)?;
        info!(rounds, tasks = n, "schedule converged");
        self.assemble()
    }

    /// Builds the output model from the frozen context.
    fn assemble(&self) -> Result<Schedule> {
        let ctx = &self.ctx;
        let mut schedule = Schedule::new(self.project.resolution_seconds);

        for (leaf, task) in ctx.leaves.iter().enumerate() {
            let Some(placement) = ctx.placements[leaf].as_ref() else {
                continue;
            };
            let mut bookings: BTreeMap<String, Vec<SlotRange>> = BTreeMap::new();
            for (resource, slots) in placement.booked.iter().chain(&placement.reserved) {
                bookings
                    .entry(ctx.resource_ids[*resource].clone())
                    .or_default()
                    .extend(ranges_from_slots(slots));
            }
            if let Some(pre) = ctx.prebooked.get(&task.id) {
                for (resource, slots) in pre {
                    bookings
                        .entry(ctx.resource_ids[*resource].clone())
                        .or_default()
                        .extend(ranges_from_slots(slots));
                }
            }
            for ranges in bookings.values_mut() {
                ranges.sort();
            }
            schedule.tasks.insert(
                task.id.clone(),
                TaskSchedule {
                    task_id: task.id.clone(),
                    start_slot: placement.start_slot,
                    end_slot: placement.end_slot,
                    start: ctx.grid.slot_start(placement.start_slot),
                    end: ctx.grid.slot_start(placement.end_slot),
                    bookings,
                },
            );
        }

        // Containers roll up to the min/max of their leaf descendants
        for task in &self.project.tasks {
            if self.project.is_leaf_task(&task.id) {
                continue;
            }
            let mut window: Option<(usize, usize)> = None;
            let mut stack = vec![task.id.as_str()];
            while let Some(current) = stack.pop() {
                for child in self.project.task_children(current) {
                    if let Some(ts) = schedule.tasks.get(&child.id) {
                        window = Some(match window {
                            None => (ts.start_slot, ts.end_slot),
                            Some((lo, hi)) => (lo.min(ts.start_slot), hi.max(ts.end_slot)),
                        });
                    } else {
                        stack.push(&child.id);
                    }
                }
            }
            if let Some((start_slot, end_slot)) = window {
                schedule.tasks.insert(
                    task.id.clone(),
                    TaskSchedule {
                        task_id: task.id.clone(),
                        start_slot,
                        end_slot,
                        start: ctx.grid.slot_start(start_slot),
                        end: ctx.grid.slot_start(end_slot),
                        bookings: BTreeMap::new(),
                    },
                );
            }
        }

        for (idx, id) in ctx.resource_ids.iter().enumerate() {
            if !ctx.resource_is_leaf[idx] {
                continue;
            }
            let board = &ctx.scoreboards[idx];
            let mut usage = ResourceUsage::default();
            for slot in 0..board.len() {
                match board.get(slot).state() {
                    SlotState::Booked(_) => {
                        usage.booked_slots += 1;
                        usage.first_booked_slot.get_or_insert(slot);
                        usage.last_booked_slot = Some(slot);
                    }
                    SlotState::Reserved(_) => usage.reserved_slots += 1,
                    _ => {}
                }
            }
            schedule.resources.insert(id.clone(), usage);
        }

        Ok(schedule)
    }
}

/// Collapses sorted slot indices into half-open ranges.
fn ranges_from_slots(slots: &[usize]) -> Vec<SlotRange> {
    let mut ranges: Vec<SlotRange> = Vec::new();
    for &slot in slots {
        match ranges.last_mut() {
            Some(last) if last.end == slot => last.end = slot + 1,
            _ => ranges.push(SlotRange::new(slot, slot + 1)),
        }
    }
    ranges
}

/// Propagates container anchors to leaf descendants.
///
/// A container's `end` tightens every descendant's `max_end`; in ALAP
/// mode it also becomes the end anchor of *terminal* descendants
/// (those with no end-anchored successors and no `onstart` incoming
/// edges). `start` and `min_start` tighten descendants' `min_start`;
/// `max_end` tightens `max_end`.
fn propagate_container_anchors(project: &Project, ctx: &mut SchedulerContext) {
    for task in &project.tasks {
        if project.is_leaf_task(&task.id) {
            continue;
        }
        let to_slot = |t: chrono::DateTime<chrono::Utc>| ctx.grid.index(t, true).unwrap_or(0);
        let end_slot = task.end.map(to_slot);
        let max_end_slot = task.max_end.map(to_slot);
        let start_slot = task.start.map(to_slot);
        let min_start_slot = task.min_start.map(to_slot);
        if end_slot.is_none()
            && max_end_slot.is_none()
            && start_slot.is_none()
            && min_start_slot.is_none()
        {
            continue;
        }

        let mut leaves = Vec::new();
        let mut stack = vec![task.id.as_str()];
        while let Some(current) = stack.pop() {
            for child in project.task_children(current) {
                match ctx.graph.leaf_index(&child.id) {
                    Some(leaf) => leaves.push(leaf),
                    None => stack.push(&child.id),
                }
            }
        }

        for leaf in leaves {
            let terminal = ctx.graph.outgoing[leaf].iter().all(|(_, e)| e.onstart)
                && ctx.graph.incoming[leaf].iter().all(|e| !e.onstart);
            let lt = &mut ctx.leaves[leaf];
            if let Some(end) = end_slot {
                lt.max_end = Some(lt.max_end.map_or(end, |m| m.min(end)));
                if lt.direction == Direction::Alap && lt.end_anchor.is_none() && terminal {
                    lt.end_anchor = Some(end);
                }
            }
            if let Some(max_end) = max_end_slot {
                lt.max_end = Some(lt.max_end.map_or(max_end, |m| m.min(max_end)));
            }
            let lower = start_slot.into_iter().chain(min_start_slot).max();
            if let Some(lower) = lower {
                lt.min_start = Some(lt.min_start.map_or(lower, |m| m.max(lower)));
            }
        }
    }
}

/// Propagates ALAP mode backward through dependency chains.
///
/// Every predecessor of an ALAP task with a fixed end is itself
/// scheduled ALAP, unless it is pinned down by a start anchor.
fn propagate_alap(ctx: &mut SchedulerContext) {
    let mut stack: Vec<usize> = (0..ctx.leaves.len())
        .filter(|&leaf| {
            ctx.leaves[leaf].direction == Direction::Alap
                && ctx.leaves[leaf].end_anchor.is_some()
        })
        .collect();
    let mut seen: Vec<bool> = vec![false; ctx.leaves.len()];
    for &leaf in &stack {
        seen[leaf] = true;
    }

    while let Some(leaf) = stack.pop() {
        let sources: Vec<usize> = ctx.graph.incoming[leaf]
            .iter()
            .map(|e| e.source)
            .collect();
        for source in sources {
            if seen[source] {
                continue;
            }
            seen[source] = true;
            if ctx.leaves[source].start_anchor.is_some() {
                continue;
            }
            ctx.leaves[source].direction = Direction::Alap;
            stack.push(source);
        }
    }
}
