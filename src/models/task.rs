//! Task model.
//!
//! A task is a node in the project's work-breakdown tree. Only leaves
//! (tasks without sub-tasks) consume resource time; containers roll up
//! their children's scheduled window. A leaf with no demand and no
//! children is a milestone and collapses to a single-slot placement.
//!
//! # Reference
//! Kelley & Walker (1959), "Critical-Path Planning and Scheduling"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scheduling direction for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// As soon as possible: minimize start within constraints.
    #[default]
    Asap,
    /// As late as possible: maximize end within constraints.
    Alap,
}

/// What a leaf task demands, in slot-units. Exactly one kind per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Demand {
    /// Work, satisfied through resource bookings and scaled by the
    /// booked resource's efficiency.
    Effort(u64),
    /// Clock time: a contiguous wall-clock span that ignores calendars
    /// and efficiency.
    Duration(u64),
    /// Working time on the project calendar, without efficiency
    /// scaling.
    Length(u64),
}

impl Demand {
    /// The raw slot count of the demand.
    #[inline]
    pub fn slots(&self) -> u64 {
        match self {
            Self::Effort(n) | Self::Duration(n) | Self::Length(n) => *n,
        }
    }
}

/// How a dependency edge anchors on its source task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Target start is bound by the source's end (finish-to-start).
    #[default]
    EndToStart,
    /// Target start is bound by the source's start (start-to-start).
    StartToStart,
}

/// A dependency of one task on another.
///
/// With gap `g`, an `EndToStart` edge requires
/// `target.start >= source.end + g`; a `StartToStart` edge measures
/// from the source's start instead. `max_gap` adds the matching upper
/// bound. `onstart` shifts the edge's anchor to the source's start and,
/// for an ALAP target without an end anchor, bounds the target's *end*
/// by the source's start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The task this edge depends on.
    pub source: String,
    /// Which source anchor the gap is measured from.
    pub kind: DependencyKind,
    /// Minimum gap in slots (default 0).
    pub gap: u64,
    /// Optional maximum gap in slots.
    pub max_gap: Option<u64>,
    /// Anchor on the source's start rather than its end.
    pub onstart: bool,
}

impl DependencyEdge {
    /// Creates a plain finish-to-start edge with zero gap.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: DependencyKind::EndToStart,
            gap: 0,
            max_gap: None,
            onstart: false,
        }
    }

    /// Sets the edge kind.
    pub fn with_kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the minimum gap in slots.
    pub fn with_gap(mut self, slots: u64) -> Self {
        self.gap = slots;
        self
    }

    /// Sets the maximum gap in slots.
    pub fn with_max_gap(mut self, slots: u64) -> Self {
        self.max_gap = Some(slots);
        self
    }

    /// Anchors the edge on the source's start.
    pub fn onstart(mut self) -> Self {
        self.onstart = true;
        self
    }

    /// Whether the effective source anchor is its start.
    #[inline]
    pub fn from_source_start(&self) -> bool {
        self.onstart || self.kind == DependencyKind::StartToStart
    }
}

/// One allocation group of a task.
///
/// `resources` are demanded *together*: placement intersects their
/// free/working bitmaps. Each entry in `alternatives` is a single
/// resource that can substitute for the whole primary set; candidates
/// are tried in declaration order and the one finishing earliest
/// (ASAP) or starting latest (ALAP) wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationGroup {
    /// Primary resources, all required simultaneously.
    pub resources: Vec<String>,
    /// Ordered fallback resources.
    pub alternatives: Vec<String>,
}

impl AllocationGroup {
    /// Creates a single-resource group.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resources: vec![resource.into()],
            alternatives: Vec::new(),
        }
    }

    /// Creates a group demanding several resources at once.
    pub fn team(resources: Vec<String>) -> Self {
        Self {
            resources,
            alternatives: Vec::new(),
        }
    }

    /// Adds an alternative resource.
    pub fn with_alternative(mut self, resource: impl Into<String>) -> Self {
        self.alternatives.push(resource.into());
        self
    }
}

/// A task to be scheduled.
///
/// Tasks form a tree through `parent` links. Anchors (`start`, `end`,
/// `min_start`, `max_end`) are hard constraints; `priority` breaks ties
/// and drives preemption; `contiguous` forbids splitting the placement
/// across calendar breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Parent task (container) identifier.
    pub parent: Option<String>,
    /// Scheduling direction; `None` inherits the project default.
    pub direction: Option<Direction>,
    /// The task's demand. `None` plus no children makes a milestone.
    pub demand: Option<Demand>,
    /// Ordered allocation groups.
    pub allocations: Vec<AllocationGroup>,
    /// Atomic placement: one unbroken run of slots.
    pub contiguous: bool,
    /// Scheduling priority; higher wins (default 500).
    pub priority: i32,
    /// Pinned start instant.
    pub start: Option<DateTime<Utc>>,
    /// Pinned end instant.
    pub end: Option<DateTime<Utc>>,
    /// Earliest allowed start.
    pub min_start: Option<DateTime<Utc>>,
    /// Latest allowed end.
    pub max_end: Option<DateTime<Utc>>,
    /// Incoming dependency edges (`depends`).
    pub depends: Vec<DependencyEdge>,
    /// Outgoing edges declared on this task (`precedes`); inverted to
    /// `depends` edges on the named task at graph build.
    pub precedes: Vec<DependencyEdge>,
    /// Explicit milestone marker.
    pub milestone: bool,
    /// Carried numeric attributes (rate, cost, ...). Opaque to the
    /// scheduler.
    pub attributes: HashMap<String, f64>,
}

impl Task {
    /// Creates a task with default priority and no demand.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            parent: None,
            direction: None,
            demand: None,
            allocations: Vec::new(),
            contiguous: false,
            priority: 500,
            start: None,
            end: None,
            min_start: None,
            max_end: None,
            depends: Vec::new(),
            precedes: Vec::new(),
            milestone: false,
            attributes: HashMap::new(),
        }
    }

    /// Sets the task name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the parent container.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Overrides the scheduling direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets an effort demand in slots.
    pub fn with_effort(mut self, slots: u64) -> Self {
        self.demand = Some(Demand::Effort(slots));
        self
    }

    /// Sets a duration demand in slots.
    pub fn with_duration(mut self, slots: u64) -> Self {
        self.demand = Some(Demand::Duration(slots));
        self
    }

    /// Sets a length demand in slots.
    pub fn with_length(mut self, slots: u64) -> Self {
        self.demand = Some(Demand::Length(slots));
        self
    }

    /// Adds an allocation group.
    pub fn with_allocation(mut self, group: AllocationGroup) -> Self {
        self.allocations.push(group);
        self
    }

    /// Shorthand for a single-resource allocation.
    pub fn allocate(self, resource: impl Into<String>) -> Self {
        self.with_allocation(AllocationGroup::new(resource))
    }

    /// Requires atomic (unbroken) placement.
    pub fn with_contiguous(mut self) -> Self {
        self.contiguous = true;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Pins the start instant.
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Pins the end instant.
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the earliest allowed start.
    pub fn with_min_start(mut self, t: DateTime<Utc>) -> Self {
        self.min_start = Some(t);
        self
    }

    /// Sets the latest allowed end.
    pub fn with_max_end(mut self, t: DateTime<Utc>) -> Self {
        self.max_end = Some(t);
        self
    }

    /// Adds an incoming dependency.
    pub fn with_dependency(mut self, edge: DependencyEdge) -> Self {
        self.depends.push(edge);
        self
    }

    /// Shorthand for a plain finish-to-start dependency.
    pub fn depends_on(self, source: impl Into<String>) -> Self {
        self.with_dependency(DependencyEdge::new(source))
    }

    /// Adds an outgoing `precedes` edge.
    pub fn with_precedes(mut self, edge: DependencyEdge) -> Self {
        self.precedes.push(edge);
        self
    }

    /// Marks this task as a milestone.
    pub fn as_milestone(mut self) -> Self {
        self.milestone = true;
        self
    }

    /// Adds a carried numeric attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let t = Task::new("impl")
            .with_name("Implementation")
            .with_parent("dev")
            .with_effort(8)
            .allocate("dev1")
            .with_priority(800)
            .with_contiguous()
            .with_attribute("rate", 120.0);

        assert_eq!(t.id, "impl");
        assert_eq!(t.parent.as_deref(), Some("dev"));
        assert_eq!(t.demand, Some(Demand::Effort(8)));
        assert_eq!(t.allocations.len(), 1);
        assert_eq!(t.priority, 800);
        assert!(t.contiguous);
        assert_eq!(t.attributes.get("rate"), Some(&120.0));
    }

    #[test]
    fn test_default_priority() {
        assert_eq!(Task::new("t").priority, 500);
    }

    #[test]
    fn test_dependency_edge() {
        let e = DependencyEdge::new("spec").with_gap(4).with_max_gap(8);
        assert_eq!(e.source, "spec");
        assert_eq!(e.kind, DependencyKind::EndToStart);
        assert_eq!(e.gap, 4);
        assert_eq!(e.max_gap, Some(8));
        assert!(!e.from_source_start());

        let s = DependencyEdge::new("spec").onstart();
        assert!(s.from_source_start());
        let s2 = DependencyEdge::new("spec").with_kind(DependencyKind::StartToStart);
        assert!(s2.from_source_start());
    }

    #[test]
    fn test_allocation_group() {
        let g = AllocationGroup::new("dev1")
            .with_alternative("dev2")
            .with_alternative("dev3");
        assert_eq!(g.resources, vec!["dev1"]);
        assert_eq!(g.alternatives, vec!["dev2", "dev3"]);

        let team = AllocationGroup::team(vec!["dev1".into(), "rig".into()]);
        assert_eq!(team.resources.len(), 2);
    }

    #[test]
    fn test_demand_slots() {
        assert_eq!(Demand::Effort(8).slots(), 8);
        assert_eq!(Demand::Duration(48).slots(), 48);
        assert_eq!(Demand::Length(16).slots(), 16);
    }
}
