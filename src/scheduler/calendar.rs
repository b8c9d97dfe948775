//! Compiled per-resource working calendars.
//!
//! Turns the model-side weekly templates, shifts, leaves, and
//! vacations into a per-slot availability vector the allocator can
//! index in constant time.
//!
//! # Override layering (lowest to highest precedence)
//!
//! 1. Project default working hours
//! 2. Shift assigned to the resource
//! 3. The resource's explicit working hours
//! 4. Project-wide vacations (subtract)
//! 5. Resource leaves (subtract; shift leaves count here too)
//!
//! Explicit bookings are layered on the scoreboard as `Reserved`, not
//! here.
//!
//! # Timezones
//!
//! Weekly templates are defined in the entity's local time; every slot
//! instant is shifted by the resolved UTC offset before the weekday /
//! minute-of-day lookup. Leave ranges are wall-clock UTC ranges and
//! are applied without shifting.

use chrono::{Datelike, Duration, Timelike};

use crate::models::{
    Leave, LeaveKind, Project, Resource, TimeGrid, TimezoneResolver, WeeklyTemplate,
};

/// Availability of one slot after calendar compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAvail {
    /// Working time.
    Working,
    /// Outside the weekly template.
    Off,
    /// Subtracted by a leave or vacation.
    OnLeave(LeaveKind),
}

/// A compiled working calendar: one availability entry per grid slot.
#[derive(Debug, Clone)]
pub struct WorkingCalendar {
    slots: Vec<SlotAvail>,
}

impl WorkingCalendar {
    /// Compiles a calendar from a template and leave lists.
    ///
    /// `offset_seconds` shifts slot instants into the entity's local
    /// time before the template lookup.
    pub fn compile(
        grid: &TimeGrid,
        template: &WeeklyTemplate,
        offset_seconds: i32,
        vacations: &[Leave],
        leaves: &[Leave],
    ) -> Self {
        let mut slots = Vec::with_capacity(grid.size());
        for idx in 0..grid.size() {
            let instant = grid.slot_start(idx);
            let local = instant + Duration::seconds(i64::from(offset_seconds));
            let weekday = local.weekday().num_days_from_monday() as usize;
            let minute = (local.hour() * 60 + local.minute()) as u16;

            let mut avail = if template.covers(weekday, minute) {
                SlotAvail::Working
            } else {
                SlotAvail::Off
            };

            // Leaves subtract; the strongest kind wins on overlap
            for leave in vacations.iter().chain(leaves) {
                if leave.range.contains(instant) {
                    avail = match avail {
                        SlotAvail::OnLeave(prev) if prev >= leave.kind => SlotAvail::OnLeave(prev),
                        _ => SlotAvail::OnLeave(leave.kind),
                    };
                }
            }

            slots.push(avail);
        }
        Self { slots }
    }

    /// Compiles the effective calendar of a resource, applying the
    /// override layering.
    pub fn for_resource(
        grid: &TimeGrid,
        project: &Project,
        resource: &Resource,
        resolver: &dyn TimezoneResolver,
    ) -> Self {
        let shift = resource.shift.as_deref().and_then(|id| project.shift(id));
        let template = resource
            .working_hours
            .as_ref()
            .or(shift.map(|s| &s.template))
            .unwrap_or(&project.working_hours);

        let mut leaves = resource.leaves.clone();
        if let Some(shift) = shift {
            leaves.extend_from_slice(&shift.leaves);
        }

        let zone = resource.timezone.as_deref().or(project.timezone.as_deref());
        let offset = zone
            .and_then(|z| resolver.utc_offset_seconds(z, grid.project_start()))
            .unwrap_or(0);

        Self::compile(grid, template, offset, &project.vacations, &leaves)
    }

    /// Compiles the project default calendar (used by tasks with no
    /// allocations and by length demands).
    pub fn project_default(
        grid: &TimeGrid,
        project: &Project,
        resolver: &dyn TimezoneResolver,
    ) -> Self {
        let offset = project
            .timezone
            .as_deref()
            .and_then(|z| resolver.utc_offset_seconds(z, grid.project_start()))
            .unwrap_or(0);
        Self::compile(grid, &project.working_hours, offset, &project.vacations, &[])
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the calendar covers no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Availability of one slot.
    #[inline]
    pub fn availability(&self, idx: usize) -> SlotAvail {
        self.slots[idx]
    }

    /// Whether a slot is working time.
    #[inline]
    pub fn is_working(&self, idx: usize) -> bool {
        self.slots[idx] == SlotAvail::Working
    }

    /// The nearest working slot at or after `from`.
    pub fn next_working_slot(&self, from: usize) -> Option<usize> {
        (from..self.slots.len()).find(|&idx| self.is_working(idx))
    }

    /// The nearest working slot at or before `from`.
    pub fn prev_working_slot(&self, from: usize) -> Option<usize> {
        (0..=from.min(self.slots.len().saturating_sub(1)))
            .rev()
            .find(|&idx| self.is_working(idx))
    }

    /// Total working slots.
    pub fn working_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|&&a| a == SlotAvail::Working)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FixedZones, Interval, Shift};
    use chrono::{TimeZone, Utc};

    fn week_grid() -> TimeGrid {
        // Mon 2024-01-01 .. Mon 2024-01-15, hourly
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        TimeGrid::new(start, end, 3600).unwrap()
    }

    fn slot(day: usize, hour: usize) -> usize {
        day * 24 + hour
    }

    #[test]
    fn test_business_week_compilation() {
        let grid = week_grid();
        let template = WeeklyTemplate::business_week(Interval::hours(9, 17));
        let cal = WorkingCalendar::compile(&grid, &template, 0, &[], &[]);

        assert!(cal.is_working(slot(0, 9))); // Mon 09:00
        assert!(cal.is_working(slot(0, 16))); // Mon 16:00
        assert!(!cal.is_working(slot(0, 17))); // Mon 17:00
        assert!(!cal.is_working(slot(5, 12))); // Sat
        assert!(cal.is_working(slot(7, 9))); // next Mon
        // 10 business days of 8 hours in two weeks
        assert_eq!(cal.working_slots(), 10 * 8);
    }

    #[test]
    fn test_timezone_shift_moves_working_window() {
        let grid = week_grid();
        let template = WeeklyTemplate::business_week(Interval::hours(9, 17));
        // UTC+9: local 09:00 is 00:00 UTC
        let cal = WorkingCalendar::compile(&grid, &template, 9 * 3600, &[], &[]);
        assert!(cal.is_working(slot(0, 0))); // Mon 00:00 UTC = Mon 09:00 local
        assert!(!cal.is_working(slot(0, 9))); // Mon 09:00 UTC = Mon 18:00 local
    }

    #[test]
    fn test_vacation_subtracts() {
        let grid = week_grid();
        let template = WeeklyTemplate::business_week(Interval::hours(9, 17));
        let tue = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let wed = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let cal = WorkingCalendar::compile(
            &grid,
            &template,
            0,
            &[Leave::vacation(tue, wed)],
            &[],
        );

        assert!(cal.is_working(slot(0, 10)));
        assert!(!cal.is_working(slot(1, 10)));
        assert_eq!(cal.availability(slot(1, 10)), SlotAvail::OnLeave(LeaveKind::Annual));
        assert!(cal.is_working(slot(2, 10)));
    }

    #[test]
    fn test_next_prev_working_slot() {
        let grid = week_grid();
        let template = WeeklyTemplate::business_week(Interval::hours(9, 17));
        let cal = WorkingCalendar::compile(&grid, &template, 0, &[], &[]);

        assert_eq!(cal.next_working_slot(0), Some(slot(0, 9)));
        assert_eq!(cal.next_working_slot(slot(0, 9)), Some(slot(0, 9)));
        // Friday 17:00 rolls forward to Monday 09:00
        assert_eq!(cal.next_working_slot(slot(4, 17)), Some(slot(7, 9)));
        // Saturday rolls back to Friday 16:00
        assert_eq!(cal.prev_working_slot(slot(5, 3)), Some(slot(4, 16)));
        assert_eq!(cal.prev_working_slot(0), None);
    }

    #[test]
    fn test_resource_layering_shift_over_default() {
        let grid = week_grid();
        let start = grid.project_start();
        let end = grid.project_end();
        let night = WeeklyTemplate::business_week(Interval::hours(0, 8));
        let project = Project::new("p", start, end)
            .with_shift(Shift::new("night", night))
            .with_resource(Resource::new("ops").with_shift("night"))
            .with_resource(Resource::new("dev"));

        let resolver = FixedZones::new();
        let ops = WorkingCalendar::for_resource(
            &grid,
            &project,
            project.resource("ops").unwrap(),
            &resolver,
        );
        let dev = WorkingCalendar::for_resource(
            &grid,
            &project,
            project.resource("dev").unwrap(),
            &resolver,
        );

        assert!(ops.is_working(slot(0, 3)));
        assert!(!ops.is_working(slot(0, 10)));
        // dev falls back to the project default 09:00-17:00
        assert!(!dev.is_working(slot(0, 3)));
        assert!(dev.is_working(slot(0, 10)));
    }

    #[test]
    fn test_resource_explicit_hours_override_shift() {
        let grid = week_grid();
        let project = Project::new("p", grid.project_start(), grid.project_end())
            .with_shift(Shift::new(
                "night",
                WeeklyTemplate::business_week(Interval::hours(0, 8)),
            ))
            .with_resource(
                Resource::new("r")
                    .with_shift("night")
                    .with_working_hours(WeeklyTemplate::business_week(Interval::hours(12, 14))),
            );

        let resolver = FixedZones::new();
        let cal = WorkingCalendar::for_resource(
            &grid,
            &project,
            project.resource("r").unwrap(),
            &resolver,
        );
        assert!(!cal.is_working(slot(0, 3)));
        assert!(cal.is_working(slot(0, 12)));
    }
}
