//! Project container and recognised options.
//!
//! A `Project` bundles everything the engine consumes: the scheduling
//! horizon, timing resolution, default calendar and direction, shift
//! and vacation declarations, resources, tasks, and pre-placed
//! bookings. The engine itself is a pure function from this model to a
//! [`Schedule`](super::Schedule).
//!
//! # Timezones
//!
//! Working hours are interpreted in each resource's local time. Zone
//! data lives outside the engine: a [`TimezoneResolver`] answers "UTC
//! offset of zone Z at instant t". [`FixedZones`] is the bundled
//! table-driven implementation; richer resolvers can be supplied to
//! [`schedule_with`](crate::scheduler::schedule_with).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::calendar::{Booking, Interval, Leave, Shift, WeeklyTemplate};
use super::grid::TimeGrid;
use super::resource::Resource;
use super::task::{Direction, Task};
use crate::error::Result;

/// Answers timezone offset queries.
///
/// The offset may depend on the instant (daylight saving), which is why
/// the query carries one.
pub trait TimezoneResolver {
    /// UTC offset of `zone` in seconds at instant `at`, or `None` for
    /// an unknown zone.
    fn utc_offset_seconds(&self, zone: &str, at: DateTime<Utc>) -> Option<i32>;
}

/// Table-driven timezone resolver with fixed offsets.
///
/// Suitable for projects whose horizon does not cross a DST change.
/// Unknown zones resolve to `None`; the engine treats that as UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedZones {
    offsets: HashMap<String, i32>,
}

impl FixedZones {
    /// Creates an empty table (everything resolves as UTC).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone with a fixed offset in seconds east of UTC.
    pub fn with_zone(mut self, zone: impl Into<String>, offset_seconds: i32) -> Self {
        self.offsets.insert(zone.into(), offset_seconds);
        self
    }
}

impl TimezoneResolver for FixedZones {
    fn utc_offset_seconds(&self, zone: &str, _at: DateTime<Utc>) -> Option<i32> {
        self.offsets.get(zone).copied()
    }
}

/// Parses a `timingresolution` option value (`"1min"` .. `"1d"`).
///
/// Returns the resolution in seconds. Values coarser than one hour
/// clamp to the 1h maximum granularity the scheduler supports.
pub fn parse_timing_resolution(value: &str) -> Option<u32> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = value.split_at(split);
    let num: u32 = num.parse().ok()?;
    if num == 0 {
        return None;
    }
    let seconds = match unit.trim() {
        "min" => num.checked_mul(60)?,
        "h" => num.checked_mul(3600)?,
        "d" => num.checked_mul(86_400)?,
        _ => return None,
    };
    Some(seconds.min(3600))
}

/// The complete declarative project description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Scheduling horizon start.
    pub start: DateTime<Utc>,
    /// Scheduling horizon end.
    pub end: DateTime<Utc>,
    /// Slot width in seconds (`timingresolution`, default 3600).
    pub resolution_seconds: u32,
    /// Project timezone name. `None` means UTC.
    pub timezone: Option<String>,
    /// Output time format, passed through to the reporter untouched.
    pub time_format: Option<String>,
    /// Default scheduling direction (`scheduling asap|alap`).
    pub direction: Direction,
    /// Default working hours for entities without their own calendar.
    pub working_hours: WeeklyTemplate,
    /// Named shift templates.
    pub shifts: Vec<Shift>,
    /// Project-wide off-duty periods (`vacation`).
    pub vacations: Vec<Leave>,
    /// Resource declarations, in declaration order.
    pub resources: Vec<Resource>,
    /// Task declarations, in declaration order.
    pub tasks: Vec<Task>,
    /// Pre-placed reservations.
    pub bookings: Vec<Booking>,
    /// Fixed-offset timezone table used by the default entry point.
    pub timezones: FixedZones,
}

impl Project {
    /// Creates a project over `[start, end]` with the default 1h
    /// resolution, Mon-Fri 09:00-17:00 hours, and ASAP direction.
    pub fn new(id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            start,
            end,
            resolution_seconds: 3600,
            timezone: None,
            time_format: None,
            direction: Direction::Asap,
            working_hours: WeeklyTemplate::business_week(Interval::hours(9, 17)),
            shifts: Vec::new(),
            vacations: Vec::new(),
            resources: Vec::new(),
            tasks: Vec::new(),
            bookings: Vec::new(),
            timezones: FixedZones::new(),
        }
    }

    /// Sets the project name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the timing resolution in seconds.
    pub fn with_resolution(mut self, seconds: u32) -> Self {
        self.resolution_seconds = seconds;
        self
    }

    /// Sets the project timezone.
    pub fn with_timezone(mut self, zone: impl Into<String>) -> Self {
        self.timezone = Some(zone.into());
        self
    }

    /// Sets the reporter time format (pass-through).
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = Some(format.into());
        self
    }

    /// Sets the default scheduling direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the default working hours (`dailyworkinghours`).
    pub fn with_working_hours(mut self, template: WeeklyTemplate) -> Self {
        self.working_hours = template;
        self
    }

    /// Registers a named shift.
    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shifts.push(shift);
        self
    }

    /// Adds a project-wide vacation.
    pub fn with_vacation(mut self, leave: Leave) -> Self {
        self.vacations.push(leave);
        self
    }

    /// Adds a resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Adds a task.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Adds a pre-placed booking.
    pub fn with_booking(mut self, booking: Booking) -> Self {
        self.bookings.push(booking);
        self
    }

    /// Adds a fixed-offset timezone.
    pub fn with_zone(mut self, zone: impl Into<String>, offset_seconds: i32) -> Self {
        self.timezones = self.timezones.with_zone(zone, offset_seconds);
        self
    }

    /// Builds the time grid for this project.
    pub fn grid(&self) -> Result<TimeGrid> {
        TimeGrid::new(self.start, self.end, self.resolution_seconds)
    }

    /// Looks up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Looks up a resource by id.
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Looks up a shift by id.
    pub fn shift(&self, id: &str) -> Option<&Shift> {
        self.shifts.iter().find(|s| s.id == id)
    }

    /// Whether a task has no sub-tasks.
    pub fn is_leaf_task(&self, id: &str) -> bool {
        !self.tasks.iter().any(|t| t.parent.as_deref() == Some(id))
    }

    /// Whether a resource has no children.
    pub fn is_leaf_resource(&self, id: &str) -> bool {
        !self
            .resources
            .iter()
            .any(|r| r.parent.as_deref() == Some(id))
    }

    /// Direct children of a task, in declaration order.
    pub fn task_children(&self, id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.parent.as_deref() == Some(id))
            .collect()
    }

    /// The effective scheduling direction of a task.
    pub fn task_direction(&self, task: &Task) -> Direction {
        task.direction.unwrap_or(self.direction)
    }

    /// Whether a task is a milestone: explicitly flagged, or a leaf
    /// with no demand.
    pub fn is_milestone(&self, task: &Task) -> bool {
        task.milestone || (task.demand.is_none() && self.is_leaf_task(&task.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_project() -> Project {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Project::new("prj", start, end)
    }

    #[test]
    fn test_defaults() {
        let p = base_project();
        assert_eq!(p.resolution_seconds, 3600);
        assert_eq!(p.direction, Direction::Asap);
        // Default calendar is a Mon-Fri business week
        assert!(p.working_hours.covers(0, 10 * 60));
        assert!(!p.working_hours.covers(6, 10 * 60));
    }

    #[test]
    fn test_parse_timing_resolution() {
        assert_eq!(parse_timing_resolution("1min"), Some(60));
        assert_eq!(parse_timing_resolution("15min"), Some(900));
        assert_eq!(parse_timing_resolution("1h"), Some(3600));
        // Coarser than 1h clamps to the supported maximum
        assert_eq!(parse_timing_resolution("1d"), Some(3600));
        assert_eq!(parse_timing_resolution("0min"), None);
        assert_eq!(parse_timing_resolution("fast"), None);
        assert_eq!(parse_timing_resolution("5x"), None);
    }

    #[test]
    fn test_leaf_and_container_tasks() {
        let p = base_project()
            .with_task(Task::new("dev"))
            .with_task(Task::new("impl").with_parent("dev").with_effort(8))
            .with_task(Task::new("test").with_parent("dev").with_effort(4));

        assert!(!p.is_leaf_task("dev"));
        assert!(p.is_leaf_task("impl"));
        assert_eq!(p.task_children("dev").len(), 2);
    }

    #[test]
    fn test_milestone_detection() {
        let p = base_project()
            .with_task(Task::new("m1"))
            .with_task(Task::new("work").with_effort(8))
            .with_task(Task::new("phase"))
            .with_task(Task::new("child").with_parent("phase").with_effort(2));

        assert!(p.is_milestone(p.task("m1").unwrap()));
        assert!(!p.is_milestone(p.task("work").unwrap()));
        // Container without demand is not a milestone
        assert!(!p.is_milestone(p.task("phase").unwrap()));
    }

    #[test]
    fn test_fixed_zones() {
        let p = base_project().with_zone("Asia/Tokyo", 9 * 3600);
        let at = p.start;
        assert_eq!(
            p.timezones.utc_offset_seconds("Asia/Tokyo", at),
            Some(9 * 3600)
        );
        assert_eq!(p.timezones.utc_offset_seconds("Mars/Olympus", at), None);
    }

    #[test]
    fn test_direction_inheritance() {
        let p = base_project().with_direction(Direction::Alap);
        let inherit = Task::new("a");
        let explicit = Task::new("b").with_direction(Direction::Asap);
        assert_eq!(p.task_direction(&inherit), Direction::Alap);
        assert_eq!(p.task_direction(&explicit), Direction::Asap);
    }
}
