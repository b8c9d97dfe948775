//! Allocation limit accounting.
//!
//! Tracks booked slots per calendar window and answers "may this
//! resource take one more slot here?". Daily windows follow calendar
//! days, weekly windows follow ISO weeks (Monday-Sunday) so a weekly
//! cap resets on Monday regardless of when the project starts, and
//! monthly windows follow calendar months.
//!
//! Limits aggregate through the resource hierarchy: booking a child
//! counts against every ancestor's caps too. Pre-placed bookings do
//! not count (only allocator-made bookings do).

use chrono::{Datelike, Duration};

use crate::models::{LimitSet, TimeGrid};

/// Per-slot window indices, shared by all resources.
#[derive(Debug, Clone)]
pub struct LimitWindows {
    day: Vec<u32>,
    week: Vec<u32>,
    month: Vec<u32>,
    day_count: usize,
    week_count: usize,
    month_count: usize,
}

impl LimitWindows {
    /// Precomputes window indices for every slot of the grid.
    pub fn new(grid: &TimeGrid) -> Self {
        let start_date = grid.project_start().date_naive();
        // Monday of the project's first ISO week anchors week indices
        let week_anchor =
            start_date - Duration::days(i64::from(start_date.weekday().num_days_from_monday()));
        let month_anchor = start_date.year() * 12 + start_date.month0() as i32;

        let mut day = Vec::with_capacity(grid.size());
        let mut week = Vec::with_capacity(grid.size());
        let mut month = Vec::with_capacity(grid.size());
        for idx in 0..grid.size() {
            let date = grid.slot_start(idx).date_naive();
            day.push((date - start_date).num_days().max(0) as u32);
            week.push(((date - week_anchor).num_days().max(0) / 7) as u32);
            let months = date.year() * 12 + date.month0() as i32 - month_anchor;
            month.push(months.max(0) as u32);
        }

        let day_count = day.iter().max().map_or(0, |&m| m as usize + 1);
        let week_count = week.iter().max().map_or(0, |&m| m as usize + 1);
        let month_count = month.iter().max().map_or(0, |&m| m as usize + 1);

        Self {
            day,
            week,
            month,
            day_count,
            week_count,
            month_count,
        }
    }

    /// Calendar-day window of a slot.
    #[inline]
    pub fn day_of(&self, slot: usize) -> u32 {
        self.day[slot]
    }

    /// ISO-week window of a slot.
    #[inline]
    pub fn week_of(&self, slot: usize) -> u32 {
        self.week[slot]
    }
}

/// Counters for one resource.
#[derive(Debug, Clone)]
struct LimitEntry {
    limits: LimitSet,
    per_day: Vec<u32>,
    per_week: Vec<u32>,
    per_month: Vec<u32>,
}

impl LimitEntry {
    fn new(limits: LimitSet, windows: &LimitWindows) -> Self {
        // Counters only materialize for constrained resources
        let sized = |on: bool, n: usize| if on { vec![0; n] } else { Vec::new() };
        Self {
            per_day: sized(limits.daily_max.is_some(), windows.day_count),
            per_week: sized(limits.weekly_max.is_some(), windows.week_count),
            per_month: sized(limits.monthly_max.is_some(), windows.month_count),
            limits,
        }
    }

    fn blocking_limit(&self, windows: &LimitWindows, slot: usize) -> Option<&'static str> {
        if let Some(cap) = self.limits.daily_max {
            if self.per_day[windows.day[slot] as usize] >= cap {
                return Some("dailymax");
            }
        }
        if let Some(cap) = self.limits.weekly_max {
            if self.per_week[windows.week[slot] as usize] >= cap {
                return Some("weeklymax");
            }
        }
        if let Some(cap) = self.limits.monthly_max {
            if self.per_month[windows.month[slot] as usize] >= cap {
                return Some("monthlymax");
            }
        }
        None
    }

    fn inc(&mut self, windows: &LimitWindows, slot: usize) {
        if !self.per_day.is_empty() {
            self.per_day[windows.day[slot] as usize] += 1;
        }
        if !self.per_week.is_empty() {
            self.per_week[windows.week[slot] as usize] += 1;
        }
        if !self.per_month.is_empty() {
            self.per_month[windows.month[slot] as usize] += 1;
        }
    }

    fn dec(&mut self, windows: &LimitWindows, slot: usize) {
        if !self.per_day.is_empty() {
            let c = &mut self.per_day[windows.day[slot] as usize];
            *c = c.saturating_sub(1);
        }
        if !self.per_week.is_empty() {
            let c = &mut self.per_week[windows.week[slot] as usize];
            *c = c.saturating_sub(1);
        }
        if !self.per_month.is_empty() {
            let c = &mut self.per_month[windows.month[slot] as usize];
            *c = c.saturating_sub(1);
        }
    }
}

/// Limit ledger for every resource, with hierarchy aggregation.
#[derive(Debug, Clone)]
pub struct LimitLedger {
    windows: LimitWindows,
    entries: Vec<LimitEntry>,
    /// Ancestor chain per resource (self first, root last).
    chains: Vec<Vec<usize>>,
}

impl LimitLedger {
    /// Builds a ledger.
    ///
    /// `limits[i]` is the limit set of resource `i`; `parents[i]` its
    /// parent resource index, if any.
    pub fn new(grid: &TimeGrid, limits: &[LimitSet], parents: &[Option<usize>]) -> Self {
        let windows = LimitWindows::new(grid);
        let entries = limits
            .iter()
            .map(|l| LimitEntry::new(*l, &windows))
            .collect();
        let chains = (0..limits.len())
            .map(|mut idx| {
                let mut chain = vec![idx];
                while let Some(parent) = parents[idx] {
                    chain.push(parent);
                    idx = parent;
                }
                chain
            })
            .collect();
        Self {
            windows,
            entries,
            chains,
        }
    }

    /// The shared window mapping.
    pub fn windows(&self) -> &LimitWindows {
        &self.windows
    }

    /// Whether `resource` (and all its ancestors) can take one more
    /// slot at `slot`.
    pub fn ok(&self, resource: usize, slot: usize) -> bool {
        self.blocking_limit(resource, slot).is_none()
    }

    /// The first exhausted limit on the ancestor chain, if any, as
    /// `(resource_index, limit_name)`.
    pub fn blocking_limit(&self, resource: usize, slot: usize) -> Option<(usize, &'static str)> {
        for &idx in &self.chains[resource] {
            if let Some(name) = self.entries[idx].blocking_limit(&self.windows, slot) {
                return Some((idx, name));
            }
        }
        None
    }

    /// Counts a booked slot against `resource` and its ancestors.
    pub fn inc(&mut self, resource: usize, slot: usize) {
        for i in 0..self.chains[resource].len() {
            let idx = self.chains[resource][i];
            self.entries[idx].inc(&self.windows, slot);
        }
    }

    /// Releases a booked slot from `resource` and its ancestors.
    pub fn dec(&mut self, resource: usize, slot: usize) {
        for i in 0..self.chains[resource].len() {
            let idx = self.chains[resource][i];
            self.entries[idx].dec(&self.windows, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn grid() -> TimeGrid {
        // Mon 2024-01-01 .. Mon 2024-01-29, hourly
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 29, 0, 0, 0).unwrap();
        TimeGrid::new(start, end, 3600).unwrap()
    }

    #[test]
    fn test_window_indices() {
        let w = LimitWindows::new(&grid());
        assert_eq!(w.day_of(0), 0);
        assert_eq!(w.day_of(23), 0);
        assert_eq!(w.day_of(24), 1);
        // Project starts on a Monday, so ISO weeks flip every 7 days
        assert_eq!(w.week_of(6 * 24 + 23), 0); // Sun 23:00
        assert_eq!(w.week_of(7 * 24), 1); // next Mon 00:00
    }

    #[test]
    fn test_week_windows_follow_iso_weeks_midweek_start() {
        // Project starts Thu 2024-01-04: Thu-Sun share week 0, Monday
        // starts week 1 even though only 4 days elapsed
        let start = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 18, 0, 0, 0).unwrap();
        let g = TimeGrid::new(start, end, 3600).unwrap();
        let w = LimitWindows::new(&g);
        assert_eq!(w.week_of(0), 0);
        assert_eq!(w.week_of(3 * 24 + 23), 0); // Sun 23:00
        assert_eq!(w.week_of(4 * 24), 1); // Mon 00:00
    }

    #[test]
    fn test_daily_cap() {
        let g = grid();
        let limits = vec![LimitSet::new().with_daily_max(2)];
        let mut ledger = LimitLedger::new(&g, &limits, &[None]);

        assert!(ledger.ok(0, 9));
        ledger.inc(0, 9);
        ledger.inc(0, 10);
        assert!(!ledger.ok(0, 11));
        assert_eq!(ledger.blocking_limit(0, 11), Some((0, "dailymax")));
        // Next day is a fresh window
        assert!(ledger.ok(0, 24 + 9));
        // Releasing a slot reopens the window
        ledger.dec(0, 10);
        assert!(ledger.ok(0, 11));
    }

    #[test]
    fn test_weekly_cap() {
        let g = grid();
        let limits = vec![LimitSet::new().with_weekly_max(3)];
        let mut ledger = LimitLedger::new(&g, &limits, &[None]);

        for day in 0..3 {
            ledger.inc(0, day * 24 + 9);
        }
        // Thursday of the same ISO week is capped
        assert!(!ledger.ok(0, 3 * 24 + 9));
        // Monday of the next ISO week is open
        assert!(ledger.ok(0, 7 * 24 + 9));
    }

    #[test]
    fn test_hierarchical_aggregation() {
        let g = grid();
        // Resource 0 is the container with the cap; 1 and 2 are its
        // children without caps of their own
        let limits = vec![
            LimitSet::new().with_daily_max(2),
            LimitSet::new(),
            LimitSet::new(),
        ];
        let parents = vec![None, Some(0), Some(0)];
        let mut ledger = LimitLedger::new(&g, &limits, &parents);

        ledger.inc(1, 9);
        ledger.inc(2, 10);
        // Both children's bookings consumed the parent's daily quota
        assert!(!ledger.ok(1, 11));
        assert!(!ledger.ok(2, 11));
        assert_eq!(ledger.blocking_limit(1, 11), Some((0, "dailymax")));
    }
}
