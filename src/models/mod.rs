//! Scheduling domain models.
//!
//! The declarative input side of the engine: projects, tasks,
//! resources, calendars, and the time grid, plus the schedule output
//! model. Everything here is plain data; the engine in
//! [`scheduler`](crate::scheduler) does the work.

mod calendar;
mod grid;
mod project;
mod resource;
mod schedule;
mod task;

pub use calendar::{
    Booking, Interval, Leave, LeaveKind, Shift, TimeRange, Weekday, WeeklyTemplate, WorkingDay,
    MINUTES_PER_DAY,
};
pub use grid::TimeGrid;
pub use project::{parse_timing_resolution, FixedZones, Project, TimezoneResolver};
pub use resource::{Efficiency, LimitSet, Resource};
pub use schedule::{ResourceUsage, Schedule, SlotRange, TaskSchedule};
pub use task::{AllocationGroup, Demand, DependencyEdge, DependencyKind, Direction, Task};
