//! The scheduling engine.
//!
//! Components, leaves first: packed per-resource scoreboards, compiled
//! working calendars, the dependency graph, the task state machine,
//! limit-window accounting, constraint propagation, the ASAP/ALAP
//! allocator, and the fixed-point driver that ties them together.
//!
//! All engine state lives on an explicit [`SchedulerContext`] built
//! per run; there is no ambient or global state. The public entry
//! points are [`schedule`] and [`schedule_with`].

pub mod allocator;
pub mod calendar;
pub mod constraint;
pub mod driver;
pub mod graph;
pub mod limits;
pub mod scoreboard;
pub mod state;

use std::collections::HashMap;

use crate::error::{Result, SchedulerError};
use crate::models::{
    Demand, Direction, Efficiency, Project, Schedule, TimeGrid, TimezoneResolver,
};

pub use calendar::{SlotAvail, WorkingCalendar};
pub use graph::{DependencyGraph, ResolvedEdge};
pub use limits::LimitLedger;
pub use scoreboard::{Scoreboard, SlotCell, SlotPredicate, SlotState, TaskIdx};
pub use state::{StateTracker, TaskState};

/// Schedules a project with its embedded fixed-offset timezone table.
///
/// # Example
///
/// ```
/// use chronoplan::models::{Project, Resource, Task};
/// use chrono::TimeZone;
///
/// let start = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let end = chrono::Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
/// let project = Project::new("demo", start, end)
///     .with_resource(Resource::new("dev"))
///     .with_task(Task::new("impl").with_effort(8).allocate("dev"));
///
/// let schedule = chronoplan::schedule(&project).unwrap();
/// assert_eq!(schedule.task("impl").unwrap().booked_slots(), 8);
/// ```
pub fn schedule(project: &Project) -> Result<Schedule> {
    schedule_with(project, &project.timezones)
}

/// Schedules a project with a caller-supplied timezone resolver.
pub fn schedule_with(project: &Project, resolver: &dyn TimezoneResolver) -> Result<Schedule> {
    driver::Driver::new(project, resolver)?.run()
}

/// One allocation candidate resolved to resource indices: the primary
/// set demanded together, plus single-resource alternatives.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// Primary resources, all required simultaneously.
    pub resources: Vec<usize>,
    /// Ordered fallback resources.
    pub alternatives: Vec<usize>,
}

/// A leaf task with everything resolved to indices and slots.
#[derive(Debug, Clone)]
pub struct LeafTask {
    /// Model-level task id.
    pub id: String,
    /// Effective scheduling direction (after ALAP propagation).
    pub direction: Direction,
    /// Demand kind, if any.
    pub demand: Option<Demand>,
    /// Atomic placement flag.
    pub contiguous: bool,
    /// Priority (higher wins).
    pub priority: i32,
    /// Milestone flag (explicit or implicit).
    pub milestone: bool,
    /// Pinned start slot.
    pub start_anchor: Option<usize>,
    /// Pinned end slot (exclusive bound).
    pub end_anchor: Option<usize>,
    /// Earliest allowed start slot.
    pub min_start: Option<usize>,
    /// Latest allowed end slot (exclusive bound).
    pub max_end: Option<usize>,
    /// Resolved allocation groups.
    pub groups: Vec<ResolvedGroup>,
}

/// A committed placement of one leaf.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// First occupied slot.
    pub start_slot: usize,
    /// One past the last occupied slot; equals `start_slot` for
    /// milestones.
    pub end_slot: usize,
    /// Booked slots per resource index, sorted.
    pub booked: Vec<(usize, Vec<usize>)>,
    /// Reserved slots per resource index (duration/length demands).
    pub reserved: Vec<(usize, Vec<usize>)>,
}

/// All mutable and immutable state of one scheduling run.
///
/// Built from the project model before the first round; every engine
/// operation receives it explicitly.
pub struct SchedulerContext {
    /// The time grid.
    pub grid: TimeGrid,
    /// The resolved dependency graph.
    pub graph: DependencyGraph,
    /// Leaf tasks, indexed like `graph.leaf_ids`.
    pub leaves: Vec<LeafTask>,
    /// Resource ids, in declaration order.
    pub resource_ids: Vec<String>,
    /// Parent resource index per resource.
    pub resource_parents: Vec<Option<usize>>,
    /// Whether a resource is a leaf (owns a scoreboard).
    pub resource_is_leaf: Vec<bool>,
    /// Efficiency per resource.
    pub efficiencies: Vec<Efficiency>,
    /// Compiled working calendar per resource.
    pub calendars: Vec<WorkingCalendar>,
    /// The project default calendar.
    pub project_calendar: WorkingCalendar,
    /// Scoreboard per resource (containers keep an untouched board).
    pub scoreboards: Vec<Scoreboard>,
    /// Limit counters.
    pub ledger: LimitLedger,
    /// Task state machine.
    pub states: StateTracker,
    /// Current placement per leaf.
    pub placements: Vec<Option<Placement>>,
    /// Pre-placed bookings per task id: `(resource, slots)`.
    pub prebooked: HashMap<String, Vec<(usize, Vec<usize>)>>,
}

impl SchedulerContext {
    /// Builds the context: interns resources and leaf tasks, compiles
    /// calendars, initializes scoreboards, and applies pre-placed
    /// bookings.
    pub fn new(project: &Project, resolver: &dyn TimezoneResolver) -> Result<Self> {
        let grid = project.grid()?;
        let graph = DependencyGraph::build(project)?;

        // Resources
        let resource_ids: Vec<String> = project.resources.iter().map(|r| r.id.clone()).collect();
        let resource_index: HashMap<&str, usize> = resource_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let resource_parents: Vec<Option<usize>> = project
            .resources
            .iter()
            .map(|r| {
                r.parent
                    .as_deref()
                    .and_then(|p| resource_index.get(p).copied())
            })
            .collect();
        let resource_is_leaf: Vec<bool> = resource_ids
            .iter()
            .map(|id| project.is_leaf_resource(id))
            .collect();
        let efficiencies: Vec<Efficiency> =
            project.resources.iter().map(|r| r.efficiency).collect();

        let calendars: Vec<WorkingCalendar> = project
            .resources
            .iter()
            .map(|r| WorkingCalendar::for_resource(&grid, project, r, resolver))
            .collect();
        let project_calendar = WorkingCalendar::project_default(&grid, project, resolver);

        // Scoreboards reflect the compiled calendars
        let scoreboards: Vec<Scoreboard> = calendars
            .iter()
            .map(|cal| {
                let mut sb = Scoreboard::new(grid.size());
                for idx in 0..grid.size() {
                    match cal.availability(idx) {
                        SlotAvail::Working => {}
                        SlotAvail::Off => sb.set(idx, SlotCell::OFF_DUTY),
                        SlotAvail::OnLeave(kind) => sb.set(idx, SlotCell::blocked(kind)),
                    }
                }
                sb
            })
            .collect();

        let limit_sets: Vec<_> = project.resources.iter().map(|r| r.limits).collect();
        let ledger = LimitLedger::new(&grid, &limit_sets, &resource_parents);

        // Leaf tasks
        let to_slot = |t: chrono::DateTime<chrono::Utc>| grid.index(t, true).unwrap_or(0);
        let leaves: Vec<LeafTask> = graph
            .leaf_ids
            .iter()
            .map(|id| {
                let task = project.task(id).expect("graph only names project tasks");
                let groups = task
                    .allocations
                    .iter()
                    .map(|g| ResolvedGroup {
                        resources: g
                            .resources
                            .iter()
                            .filter_map(|r| resource_index.get(r.as_str()).copied())
                            .collect(),
                        alternatives: g
                            .alternatives
                            .iter()
                            .filter_map(|r| resource_index.get(r.as_str()).copied())
                            .collect(),
                    })
                    .collect();
                LeafTask {
                    id: task.id.clone(),
                    direction: project.task_direction(task),
                    demand: task.demand,
                    contiguous: task.contiguous,
                    priority: task.priority,
                    milestone: project.is_milestone(task),
                    start_anchor: task.start.map(to_slot),
                    end_anchor: task.end.map(to_slot),
                    min_start: task.min_start.map(to_slot),
                    max_end: task.max_end.map(to_slot),
                    groups,
                }
            })
            .collect();

        let n = leaves.len();
        let requeue_cap = (2 * n.max(1)) as u32;
        let mut ctx = Self {
            states: StateTracker::new(n, requeue_cap),
            placements: vec![None; n],
            prebooked: HashMap::new(),
            grid,
            graph,
            leaves,
            resource_ids,
            resource_parents,
            resource_is_leaf,
            efficiencies,
            calendars,
            project_calendar,
            scoreboards,
            ledger,
        };
        ctx.apply_bookings(project)?;
        Ok(ctx)
    }

    /// Applies explicit `booking` declarations as `Reserved` cells.
    ///
    /// Bookings do not increment limit counters.
    fn apply_bookings(&mut self, project: &Project) -> Result<()> {
        for booking in &project.bookings {
            let resource = self
                .resource_ids
                .iter()
                .position(|id| *id == booking.resource_id)
                .ok_or_else(|| SchedulerError::InvalidModel {
                    reason: format!(
                        "booking references unknown resource '{}'",
                        booking.resource_id
                    ),
                })?;
            if project.task(&booking.task_id).is_none() {
                return Err(SchedulerError::InvalidModel {
                    reason: format!("booking references unknown task '{}'", booking.task_id),
                });
            }
            // Reservations on the scoreboard carry the leaf index when
            // the task is a leaf; container bookings keep a sentinel
            let marker = self
                .graph
                .leaf_index(&booking.task_id)
                .map(|i| i as TaskIdx)
                .unwrap_or(TaskIdx::MAX);

            let mut slots = Vec::new();
            for range in &booking.ranges {
                let lo = self.grid.index(range.start, true)?;
                let hi = self.grid.index(range.end, true)?;
                for idx in lo..hi {
                    if self.scoreboards[resource].get(idx).is_unoccupied() {
                        self.scoreboards[resource].set(idx, SlotCell::reserved(marker));
                        slots.push(idx);
                    }
                }
            }
            if !slots.is_empty() {
                let entry = self
                    .prebooked
                    .entry(booking.task_id.clone())
                    .or_default();
                match entry.iter_mut().find(|(r, _)| *r == resource) {
                    Some((_, existing)) => {
                        existing.extend_from_slice(&slots);
                        existing.sort_unstable();
                    }
                    None => entry.push((resource, slots)),
                }
            }
        }
        Ok(())
    }

    /// Releases every booked slot of a leaf and clears its placement.
    pub fn release(&mut self, leaf: usize) {
        let marker = leaf as TaskIdx;
        if let Some(placement) = self.placements[leaf].take() {
            for (resource, slots) in &placement.booked {
                for &slot in slots {
                    if self.scoreboards[*resource].get(slot).state() == SlotState::Booked(marker) {
                        self.scoreboards[*resource].set(slot, SlotCell::FREE);
                        self.ledger.dec(*resource, slot);
                    }
                }
            }
            for (resource, slots) in &placement.reserved {
                for &slot in slots {
                    // Commit skips occupied cells, so only cells this
                    // leaf actually reserved are restored
                    if self.scoreboards[*resource].get(slot).state() != SlotState::Reserved(marker)
                    {
                        continue;
                    }
                    let cell = match self.calendars[*resource].availability(slot) {
                        SlotAvail::Working => SlotCell::FREE,
                        SlotAvail::Off => SlotCell::OFF_DUTY,
                        SlotAvail::OnLeave(kind) => SlotCell::blocked(kind),
                    };
                    self.scoreboards[*resource].set(slot, cell);
                }
            }
        }
    }

    /// Commits a placement: books and reserves its slots.
    pub fn commit(&mut self, leaf: usize, placement: Placement) {
        for (resource, slots) in &placement.booked {
            self.scoreboards[*resource].book_slots(slots, leaf as TaskIdx);
            for &slot in slots {
                self.ledger.inc(*resource, slot);
            }
        }
        for (resource, slots) in &placement.reserved {
            for &slot in slots {
                if self.scoreboards[*resource].get(slot).is_unoccupied() {
                    self.scoreboards[*resource].set(slot, SlotCell::reserved(leaf as TaskIdx));
                }
            }
        }
        self.placements[leaf] = Some(placement);
    }

    /// Upper slot bound used when no anchor tightens it: the last slot
    /// inside the project horizon (exclusive bound).
    #[inline]
    pub fn horizon(&self) -> usize {
        self.grid.size() - 1
    }
}
