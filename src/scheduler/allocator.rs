//! The allocator: placing one task on its resources.
//!
//! Given a Ready leaf and its `[lb, ub)` window, chooses a resource
//! set from the task's allocation groups and walks the scoreboards to
//! place the demand:
//!
//! - **Effort** books free working slots, scaled by the booked set's
//!   efficiency; discontiguous unless the task is `contiguous`.
//! - **Duration** reserves a contiguous clock-time range, ignoring
//!   calendars.
//! - **Length** reserves working slots on the project calendar,
//!   without efficiency scaling.
//!
//! Alternatives are tried in declaration order; the candidate
//! finishing earliest (ASAP) or starting latest (ALAP) wins. When a
//! required slot is booked by a strictly lower-priority task and no
//! eviction-free candidate fits, the allocator claims the slot and
//! reports the victim for re-queueing.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::models::{Demand, Direction, Efficiency};

use super::constraint::Bounds;
use super::{LimitLedger, Placement, SchedulerContext, SlotPredicate, TaskState};

/// The allocator's answer for one task.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    /// The placement to commit.
    pub placement: Placement,
    /// Lower-priority tasks whose bookings must be released and
    /// re-queued before committing.
    pub victims: Vec<usize>,
}

/// Places a Ready leaf inside its bounds.
pub fn place(ctx: &SchedulerContext, leaf: usize, bounds: &Bounds) -> Result<PlacementResult> {
    let task = &ctx.leaves[leaf];

    if task.milestone || task.demand.is_none() {
        return place_milestone(ctx, leaf, bounds);
    }
    match task.demand.expect("non-milestone leaf has a demand") {
        Demand::Duration(slots) => place_duration(ctx, leaf, bounds, slots as usize),
        Demand::Length(slots) => place_length(ctx, leaf, bounds, slots as usize),
        Demand::Effort(slots) => place_effort(ctx, leaf, bounds, slots),
    }
}

/// Milestones collapse to a single zero-width slot at the binding
/// bound.
fn place_milestone(
    ctx: &SchedulerContext,
    leaf: usize,
    bounds: &Bounds,
) -> Result<PlacementResult> {
    let task = &ctx.leaves[leaf];
    // An anchored milestone sits at its anchor; otherwise it collapses
    // onto the binding bound of its direction
    let slot = if task.start_anchor.is_some() {
        bounds.lb
    } else if let Some(end) = task.end_anchor {
        end.clamp(bounds.lb, bounds.ub)
    } else {
        match task.direction {
            Direction::Asap => bounds.lb,
            Direction::Alap => bounds.ub,
        }
    };
    check_start_bound(ctx, leaf, slot, bounds)?;
    Ok(PlacementResult {
        placement: Placement {
            start_slot: slot,
            end_slot: slot,
            booked: Vec::new(),
            reserved: Vec::new(),
        },
        victims: Vec::new(),
    })
}

/// Duration: a contiguous clock-time range, calendar-blind.
fn place_duration(
    ctx: &SchedulerContext,
    leaf: usize,
    bounds: &Bounds,
    demand: usize,
) -> Result<PlacementResult> {
    let task = &ctx.leaves[leaf];
    if bounds.ub - bounds.lb < demand {
        return Err(SchedulerError::Unsatisfiable {
            task_id: task.id.clone(),
            lb: bounds.lb,
            ub: bounds.ub,
        });
    }
    let (start, end) = match task.direction {
        Direction::Asap => (bounds.lb, bounds.lb + demand),
        Direction::Alap => (bounds.ub - demand, bounds.ub),
    };
    check_start_bound(ctx, leaf, start, bounds)?;
    let slots: Vec<usize> = (start..end).collect();
    Ok(PlacementResult {
        placement: Placement {
            start_slot: start,
            end_slot: end,
            booked: Vec::new(),
            reserved: reserve_on_primaries(ctx, leaf, &slots),
        },
        victims: Vec::new(),
    })
}

/// Length: working slots on the project calendar, no efficiency.
fn place_length(
    ctx: &SchedulerContext,
    leaf: usize,
    bounds: &Bounds,
    demand: usize,
) -> Result<PlacementResult> {
    let task = &ctx.leaves[leaf];
    let mut slots = Vec::with_capacity(demand);
    match task.direction {
        Direction::Asap => {
            for idx in bounds.lb..bounds.ub {
                if ctx.project_calendar.is_working(idx) {
                    slots.push(idx);
                    if slots.len() == demand {
                        break;
                    }
                }
            }
        }
        Direction::Alap => {
            for idx in (bounds.lb..bounds.ub).rev() {
                if ctx.project_calendar.is_working(idx) {
                    slots.push(idx);
                    if slots.len() == demand {
                        break;
                    }
                }
            }
            slots.reverse();
        }
    }
    if slots.len() < demand {
        return Err(SchedulerError::Unsatisfiable {
            task_id: task.id.clone(),
            lb: bounds.lb,
            ub: bounds.ub,
        });
    }
    let start = slots[0];
    let end = slots[slots.len() - 1] + 1;
    check_start_bound(ctx, leaf, start, bounds)?;
    Ok(PlacementResult {
        placement: Placement {
            start_slot: start,
            end_slot: end,
            booked: Vec::new(),
            reserved: reserve_on_primaries(ctx, leaf, &slots),
        },
        victims: Vec::new(),
    })
}

/// Reservation targets for duration/length demands: the primary
/// resources of every group. Only unoccupied cells are reserved at
/// commit time.
fn reserve_on_primaries(
    ctx: &SchedulerContext,
    leaf: usize,
    slots: &[usize],
) -> Vec<(usize, Vec<usize>)> {
    ctx.leaves[leaf]
        .groups
        .iter()
        .flat_map(|g| g.resources.iter().copied())
        .map(|resource| (resource, slots.to_vec()))
        .collect()
}

/// One fitting candidate placement.
#[derive(Debug, Clone)]
struct Fit {
    start: usize,
    end: usize,
    slots: Vec<usize>,
    set: Vec<usize>,
    victims: BTreeSet<usize>,
}

/// Accumulated failure evidence for error synthesis.
#[derive(Debug, Default)]
struct FailEvidence {
    longest_run: usize,
    limit_block: Option<(usize, &'static str)>,
}

fn place_effort(
    ctx: &SchedulerContext,
    leaf: usize,
    bounds: &Bounds,
    effort: u64,
) -> Result<PlacementResult> {
    let task = &ctx.leaves[leaf];
    let candidates = candidate_sets(ctx, leaf);
    if candidates.is_empty() {
        return Err(SchedulerError::NoResource {
            task_id: task.id.clone(),
            lb: bounds.lb,
            ub: bounds.ub,
        });
    }

    let mut evidence = FailEvidence::default();
    for preempt in [false, true] {
        let mut best: Option<Fit> = None;
        for set in &candidates {
            let efficiency = set_efficiency(ctx, set);
            let demand = efficiency.demand_slots(effort) as usize;
            let Some(fit) = scan_set(ctx, leaf, set, bounds, demand, preempt, &mut evidence)
            else {
                continue;
            };
            let better = match (&best, task.direction) {
                (None, _) => true,
                (Some(b), Direction::Asap) => (fit.end, fit.start) < (b.end, b.start),
                (Some(b), Direction::Alap) => (fit.start, fit.end) > (b.start, b.end),
            };
            if better {
                best = Some(fit);
            }
        }
        if let Some(fit) = best {
            debug!(
                task = %task.id,
                start = fit.start,
                end = fit.end,
                evictions = fit.victims.len(),
                "effort placed"
            );
            let booked = fit
                .set
                .iter()
                .map(|&resource| (resource, fit.slots.clone()))
                .collect();
            return Ok(PlacementResult {
                placement: Placement {
                    start_slot: fit.start,
                    end_slot: fit.end,
                    booked,
                    reserved: Vec::new(),
                },
                victims: fit.victims.into_iter().collect(),
            });
        }
    }

    // Nothing fit, with or without preemption
    if task.contiguous {
        let first = candidates[0].first().copied().unwrap_or(0);
        let efficiency = set_efficiency(ctx, &candidates[0]);
        return Err(SchedulerError::OverCapacity {
            task_id: task.id.clone(),
            resource_id: ctx.resource_ids[first].clone(),
            demand: efficiency.demand_slots(effort) as usize,
            longest: evidence.longest_run,
        });
    }
    if let Some((resource, limit)) = evidence.limit_block {
        if task.end_anchor.is_some() || task.max_end.is_some() {
            return Err(SchedulerError::LimitExceeded {
                task_id: task.id.clone(),
                resource_id: ctx.resource_ids[resource].clone(),
                limit: limit.to_string(),
            });
        }
    }
    Err(SchedulerError::NoResource {
        task_id: task.id.clone(),
        lb: bounds.lb,
        ub: bounds.ub,
    })
}

/// Enumerates candidate resource sets: the cartesian product over
/// groups of (primary set, then each alternative), in declaration
/// order.
fn candidate_sets(ctx: &SchedulerContext, leaf: usize) -> Vec<Vec<usize>> {
    let groups = &ctx.leaves[leaf].groups;
    let mut sets: Vec<Vec<usize>> = vec![Vec::new()];
    for group in groups {
        let mut options: Vec<Vec<usize>> = Vec::new();
        if !group.resources.is_empty() {
            options.push(group.resources.clone());
        }
        for &alt in &group.alternatives {
            options.push(vec![alt]);
        }
        if options.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(sets.len() * options.len());
        for base in &sets {
            for option in &options {
                let mut set = base.clone();
                set.extend_from_slice(option);
                next.push(set);
            }
        }
        sets = next;
    }
    sets.retain(|s| !s.is_empty());
    sets
}

/// The efficiency a set works at: its fastest member (the team's
/// clock-time progress is paced by the best worker, matching how
/// multi-resource effort accrues once per slot).
fn set_efficiency(ctx: &SchedulerContext, set: &[usize]) -> Efficiency {
    set.iter()
        .map(|&r| ctx.efficiencies[r])
        .max_by(|a, b| {
            (u64::from(a.num()) * u64::from(b.den()))
                .cmp(&(u64::from(b.num()) * u64::from(a.den())))
        })
        .unwrap_or(Efficiency::ONE)
}

/// How one slot can be taken for a candidate set.
enum Take {
    /// All resources free (or preemptable); victims listed.
    Yes(Vec<usize>),
    /// Slot unavailable; carries the blocking limit if that was the
    /// only obstacle.
    No(Option<(usize, &'static str)>),
}

fn take_slot(
    ctx: &SchedulerContext,
    leaf: usize,
    set: &[usize],
    idx: usize,
    preempt: bool,
    trial: &LimitLedger,
) -> Take {
    let my_priority = ctx.leaves[leaf].priority;
    let mut victims = Vec::new();
    for &resource in set {
        let cell = ctx.scoreboards[resource].get(idx);
        if cell.is_free() {
            if !trial.ok(resource, idx) {
                return Take::No(trial.blocking_limit(resource, idx));
            }
            continue;
        }
        let preemptable = preempt
            && cell.booked_task().is_some_and(|victim| {
                let victim = victim as usize;
                victim != leaf
                    && ctx.leaves[victim].priority < my_priority
                    && ctx.states.get(victim) == TaskState::Placed
            });
        if preemptable {
            victims.push(cell.booked_task().expect("preemptable cell is booked") as usize);
        } else {
            return Take::No(None);
        }
    }
    Take::Yes(victims)
}

/// Scans one candidate set for a fitting placement.
fn scan_set(
    ctx: &SchedulerContext,
    leaf: usize,
    set: &[usize],
    bounds: &Bounds,
    demand: usize,
    preempt: bool,
    evidence: &mut FailEvidence,
) -> Option<Fit> {
    if demand == 0 || bounds.ub <= bounds.lb {
        return None;
    }
    let fit = if ctx.leaves[leaf].contiguous {
        scan_contiguous(ctx, leaf, set, bounds, demand, preempt, evidence)
    } else {
        scan_accumulating(ctx, leaf, set, bounds, demand, preempt, evidence)
    }?;
    // max_gap upper pressure invalidates late-starting candidates
    if let Some(start_ub) = bounds.start_ub {
        if fit.start > start_ub {
            return None;
        }
    }
    Some(fit)
}

/// Discontiguous accumulation in scan order (forward for ASAP,
/// backward for ALAP).
///
/// The single-resource case drives off `collect_intervals`, the
/// scoreboard's primary query; the multi-resource and preemption
/// cases fall back to a slot walk over the raw window.
fn scan_accumulating(
    ctx: &SchedulerContext,
    leaf: usize,
    set: &[usize],
    bounds: &Bounds,
    demand: usize,
    preempt: bool,
    evidence: &mut FailEvidence,
) -> Option<Fit> {
    let mut trial = ctx.ledger.clone();
    let mut slots = Vec::with_capacity(demand);
    let mut victims = BTreeSet::new();
    let forward = ctx.leaves[leaf].direction == Direction::Asap;

    let indices: Box<dyn Iterator<Item = usize>> = if let [resource] = set {
        if preempt {
            window_iter(bounds, forward)
        } else {
            // Free runs only; limits filter below
            let runs = ctx.scoreboards[*resource].collect_intervals(
                bounds.lb,
                bounds.ub,
                SlotPredicate::FreeAndWorking,
                1,
            );
            run_iter(runs, forward)
        }
    } else {
        window_iter(bounds, forward)
    };

    for idx in indices {
        match take_slot(ctx, leaf, set, idx, preempt, &trial) {
            Take::Yes(slot_victims) => {
                for &resource in set {
                    if ctx.scoreboards[resource].get(idx).is_free() {
                        trial.inc(resource, idx);
                    }
                }
                victims.extend(slot_victims);
                slots.push(idx);
            }
            Take::No(limit) => {
                if evidence.limit_block.is_none() {
                    evidence.limit_block = limit;
                }
            }
        }
        if slots.len() == demand {
            if !forward {
                slots.reverse();
            }
            return Some(Fit {
                start: slots[0],
                end: slots[slots.len() - 1] + 1,
                slots,
                set: set.to_vec(),
                victims,
            });
        }
    }
    None
}

/// Every slot of the window, in scan order.
fn window_iter(bounds: &Bounds, forward: bool) -> Box<dyn Iterator<Item = usize>> {
    if forward {
        Box::new(bounds.lb..bounds.ub)
    } else {
        Box::new((bounds.lb..bounds.ub).rev())
    }
}

/// The slots of collected runs, in scan order.
fn run_iter(
    runs: Vec<crate::models::SlotRange>,
    forward: bool,
) -> Box<dyn Iterator<Item = usize>> {
    if forward {
        Box::new(runs.into_iter().flat_map(|r| r.start..r.end))
    } else {
        Box::new(
            runs.into_iter()
                .rev()
                .flat_map(|r| (r.start..r.end).rev()),
        )
    }
}

/// Contiguous placement: the first (ASAP) or last (ALAP) unbroken run
/// of `demand` eligible slots.
///
/// The single-resource case narrows to runs already long enough via
/// `collect_intervals` and only re-checks limits inside them.
fn scan_contiguous(
    ctx: &SchedulerContext,
    leaf: usize,
    set: &[usize],
    bounds: &Bounds,
    demand: usize,
    preempt: bool,
    evidence: &mut FailEvidence,
) -> Option<Fit> {
    let forward = ctx.leaves[leaf].direction == Direction::Asap;

    if let ([resource], false) = (set, preempt) {
        let board = &ctx.scoreboards[*resource];
        let runs =
            board.collect_intervals(bounds.lb, bounds.ub, SlotPredicate::FreeAndWorking, demand);
        // Longest free run regardless of the demand cut, for the
        // OverCapacity report
        evidence.longest_run = evidence.longest_run.max(
            board
                .collect_intervals(bounds.lb, bounds.ub, SlotPredicate::FreeAndWorking, 1)
                .iter()
                .map(|r| r.len())
                .max()
                .unwrap_or(0),
        );
        let ordered: Vec<_> = if forward {
            runs
        } else {
            runs.into_iter().rev().collect()
        };
        for run in ordered {
            if let Some(fit) =
                fit_in_run(ctx, set, run.start, run.end, demand, forward, evidence)
            {
                return Some(fit);
            }
        }
        return None;
    }

    let mut anchor = if forward { bounds.lb } else { bounds.ub };

    loop {
        if forward {
            if anchor + demand > bounds.ub {
                return None;
            }
        } else if anchor < bounds.lb + demand {
            return None;
        }

        let mut trial = ctx.ledger.clone();
        let mut victims = BTreeSet::new();
        let mut run = 0usize;
        let mut broke_at = None;

        while run < demand {
            let idx = if forward { anchor + run } else { anchor - 1 - run };
            match take_slot(ctx, leaf, set, idx, preempt, &trial) {
                Take::Yes(slot_victims) => {
                    for &resource in set {
                        if ctx.scoreboards[resource].get(idx).is_free() {
                            trial.inc(resource, idx);
                        }
                    }
                    victims.extend(slot_victims);
                    run += 1;
                }
                Take::No(limit) => {
                    if evidence.limit_block.is_none() {
                        evidence.limit_block = limit;
                    }
                    broke_at = Some(idx);
                    break;
                }
            }
        }
        evidence.longest_run = evidence.longest_run.max(run);

        if run == demand {
            let start = if forward { anchor } else { anchor - demand };
            return Some(Fit {
                start,
                end: start + demand,
                slots: (start..start + demand).collect(),
                set: set.to_vec(),
                victims,
            });
        }
        // Resume past the break
        let broke_at = broke_at.expect("incomplete run always records a break");
        anchor = if forward { broke_at + 1 } else { broke_at };
    }
}

/// Tries to anchor `demand` consecutive slots inside one free run,
/// filtering on limits only (the run's cells are already known free).
fn fit_in_run(
    ctx: &SchedulerContext,
    set: &[usize],
    run_start: usize,
    run_end: usize,
    demand: usize,
    forward: bool,
    evidence: &mut FailEvidence,
) -> Option<Fit> {
    let resource = set[0];
    let mut anchor = if forward { run_start } else { run_end };
    loop {
        if forward {
            if anchor + demand > run_end {
                return None;
            }
        } else if anchor < run_start + demand {
            return None;
        }
        let start = if forward { anchor } else { anchor - demand };
        let mut trial = ctx.ledger.clone();
        let mut broke_at = None;
        for idx in start..start + demand {
            if trial.ok(resource, idx) {
                trial.inc(resource, idx);
            } else {
                if evidence.limit_block.is_none() {
                    evidence.limit_block = trial.blocking_limit(resource, idx);
                }
                broke_at = Some(idx);
                break;
            }
        }
        match broke_at {
            None => {
                return Some(Fit {
                    start,
                    end: start + demand,
                    slots: (start..start + demand).collect(),
                    set: set.to_vec(),
                    victims: BTreeSet::new(),
                });
            }
            Some(idx) => {
                anchor = if forward { idx + 1 } else { idx };
            }
        }
    }
}

/// Rejects placements whose start violates the `max_gap` upper
/// pressure.
fn check_start_bound(
    ctx: &SchedulerContext,
    leaf: usize,
    start: usize,
    bounds: &Bounds,
) -> Result<()> {
    if let Some(start_ub) = bounds.start_ub {
        if start > start_ub {
            return Err(SchedulerError::Unsatisfiable {
                task_id: ctx.leaves[leaf].id.clone(),
                lb: bounds.lb,
                ub: start_ub,
            });
        }
    }
    Ok(())
}
