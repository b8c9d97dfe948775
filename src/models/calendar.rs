//! Working-hour calendars: weekly templates, shifts, leaves, bookings.
//!
//! A calendar is a weekly template — for each weekday an ordered list of
//! minute-precise intervals — plus subtractive overrides (leaves,
//! vacations) and additive reservations (bookings). The engine compiles
//! these into per-resource working bitmaps; this module is the pure data
//! side.
//!
//! # Cross-midnight intervals
//!
//! An interval whose end minute is `<=` its start minute crosses
//! midnight: a `22:00 - 06:00` interval on Monday covers Mon 22:00-24:00
//! and Tue 00:00-06:00. Checking a slot therefore also consults the
//! *previous* weekday's intervals for their post-midnight half. If the
//! target weekday has no template, the slot is off-duty on that day,
//! but a cross-midnight interval anchored on the previous day may still
//! make it working.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weekday index: 0 = Monday .. 6 = Sunday.
pub type Weekday = usize;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A working interval within a day, in minutes from midnight.
///
/// Half-open: `[start_min, end_min)`. `end_min <= start_min` encodes a
/// cross-midnight interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Start, minutes from midnight (inclusive).
    pub start_min: u16,
    /// End, minutes from midnight (exclusive). `<= start_min` means the
    /// interval wraps past midnight into the next day.
    pub end_min: u16,
}

impl Interval {
    /// Creates an interval from `(hour, minute)` endpoints.
    pub fn new(start: (u16, u16), end: (u16, u16)) -> Self {
        Self {
            start_min: start.0 * 60 + start.1,
            end_min: end.0 * 60 + end.1,
        }
    }

    /// Creates an interval from whole hours.
    pub fn hours(start_h: u16, end_h: u16) -> Self {
        Self::new((start_h, 0), (end_h, 0))
    }

    /// Whether this interval wraps past midnight.
    #[inline]
    pub fn crosses_midnight(&self) -> bool {
        self.end_min <= self.start_min
    }

    /// Whether `minute` falls in the same-day part of this interval.
    ///
    /// For a cross-midnight interval this is the `>= start` evening
    /// half; the morning half belongs to the next day and is checked
    /// via [`covers_overflow`](Self::covers_overflow).
    #[inline]
    pub fn covers(&self, minute: u16) -> bool {
        if self.crosses_midnight() {
            minute >= self.start_min
        } else {
            minute >= self.start_min && minute < self.end_min
        }
    }

    /// Whether `minute` falls in the next-day morning half of a
    /// cross-midnight interval.
    #[inline]
    pub fn covers_overflow(&self, minute: u16) -> bool {
        self.crosses_midnight() && minute < self.end_min
    }

    /// Working minutes contributed by this interval.
    pub fn duration_minutes(&self) -> u16 {
        if self.crosses_midnight() {
            MINUTES_PER_DAY - self.start_min + self.end_min
        } else {
            self.end_min - self.start_min
        }
    }
}

/// Ordered working intervals for one weekday.
pub type WorkingDay = Vec<Interval>;

/// A weekly working-hours template.
///
/// One interval list per weekday (0 = Monday .. 6 = Sunday). An empty
/// day is entirely off-duty (modulo cross-midnight overflow from the
/// day before).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    /// Interval lists indexed by weekday.
    pub days: [WorkingDay; 7],
}

impl WeeklyTemplate {
    /// Creates an empty template (no working time at all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard Monday-Friday template with one interval per day.
    pub fn business_week(interval: Interval) -> Self {
        let mut t = Self::new();
        for day in 0..5 {
            t.days[day] = vec![interval];
        }
        t
    }

    /// Sets the intervals for one weekday.
    pub fn with_day(mut self, weekday: Weekday, intervals: Vec<Interval>) -> Self {
        self.days[weekday] = intervals;
        self
    }

    /// Appends intervals to several weekdays.
    ///
    /// Repeated calls for the same weekday extend the list, allowing
    /// multiple non-contiguous ranges per day.
    pub fn with_days(mut self, weekdays: &[Weekday], intervals: &[Interval]) -> Self {
        for &day in weekdays {
            self.days[day].extend_from_slice(intervals);
        }
        self
    }

    /// Whether `minute` on `weekday` is working time.
    ///
    /// Consults the weekday's own intervals and, for the morning half
    /// of cross-midnight intervals, the previous weekday's. A weekday
    /// with no intervals is off-duty except for that overflow.
    pub fn covers(&self, weekday: Weekday, minute: u16) -> bool {
        if self.days[weekday].iter().any(|iv| iv.covers(minute)) {
            return true;
        }
        let prev = (weekday + 6) % 7;
        self.days[prev].iter().any(|iv| iv.covers_overflow(minute))
    }

    /// Whether any weekday has working time.
    pub fn is_empty(&self) -> bool {
        self.days.iter().all(|d| d.is_empty())
    }

    /// Total working minutes on one weekday (same-day parts only).
    pub fn daily_minutes(&self, weekday: Weekday) -> u32 {
        self.days[weekday]
            .iter()
            .map(|iv| u32::from(iv.duration_minutes()))
            .sum()
    }

    /// Finds a pair of overlapping intervals on one weekday, if any.
    ///
    /// Overlaps are a model error (validation rejects them). Only
    /// same-day halves are compared; cross-midnight overflow into a
    /// different weekday is legal by construction.
    pub fn find_overlap(&self, weekday: Weekday) -> Option<(Interval, Interval)> {
        let day = &self.days[weekday];
        for (i, a) in day.iter().enumerate() {
            for b in &day[i + 1..] {
                let a_end = if a.crosses_midnight() {
                    MINUTES_PER_DAY
                } else {
                    a.end_min
                };
                let b_end = if b.crosses_midnight() {
                    MINUTES_PER_DAY
                } else {
                    b.end_min
                };
                if a.start_min < b_end && b.start_min < a_end {
                    return Some((*a, *b));
                }
            }
        }
        None
    }
}

/// A half-open wall-clock range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Range start (inclusive).
    pub start: DateTime<Utc>,
    /// Range end (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether an instant falls inside the range.
    #[inline]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Classification of off-duty periods.
///
/// The scheduler treats every kind as off-duty; the kind survives into
/// `Blocked` scoreboard cells for diagnostics. When ranges overlap the
/// strongest (highest) kind wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum LeaveKind {
    /// Project-wide closure.
    #[default]
    Project,
    /// Public holiday.
    Holiday,
    /// Sick leave.
    Sick,
    /// Special leave.
    Special,
    /// Unpaid leave.
    Unpaid,
    /// Annual vacation.
    Annual,
}

/// An off-duty period for a resource or the whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    /// Why the period is off-duty.
    pub kind: LeaveKind,
    /// The off-duty range.
    pub range: TimeRange,
}

impl Leave {
    /// Creates a leave of the given kind.
    pub fn new(kind: LeaveKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            kind,
            range: TimeRange::new(start, end),
        }
    }

    /// Creates an annual vacation leave.
    pub fn vacation(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(LeaveKind::Annual, start, end)
    }
}

/// A named working-hours template shared between resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    /// Shift identifier (referenced from resources).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The shift's weekly working hours.
    pub template: WeeklyTemplate,
    /// Off-duty periods attached to the shift.
    pub leaves: Vec<Leave>,
}

impl Shift {
    /// Creates a shift with the given template.
    pub fn new(id: impl Into<String>, template: WeeklyTemplate) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            template,
            leaves: Vec::new(),
        }
    }

    /// Sets the shift name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a leave.
    pub fn with_leave(mut self, leave: Leave) -> Self {
        self.leaves.push(leave);
        self
    }
}

/// A pre-placed reservation of resource time for a task.
///
/// Bookings are applied to the scoreboard as `Reserved` before
/// scheduling starts; the allocator cannot evict them and they do not
/// count against limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// The reserved resource.
    pub resource_id: String,
    /// The task holding the reservation.
    pub task_id: String,
    /// Reserved wall-clock ranges.
    pub ranges: Vec<TimeRange>,
}

impl Booking {
    /// Creates a booking.
    pub fn new(
        resource_id: impl Into<String>,
        task_id: impl Into<String>,
        ranges: Vec<TimeRange>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            task_id: task_id.into(),
            ranges,
        }
    }
}
