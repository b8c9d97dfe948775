//! Schedule output model.
//!
//! The result of a scheduling run: for every task its slot-exact and
//! wall-clock window, per-resource booking ranges, and per-resource
//! usage summaries. Maps are ordered so that serializing the same
//! schedule twice yields byte-identical output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A half-open range of slot indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRange {
    /// First slot of the range.
    pub start: usize,
    /// One past the last slot of the range.
    pub end: usize,
}

impl SlotRange {
    /// Creates a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of slots covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// The scheduled placement of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    /// Task identifier.
    pub task_id: String,
    /// First occupied slot.
    pub start_slot: usize,
    /// One past the last occupied slot. Equal to `start_slot` for
    /// milestones.
    pub end_slot: usize,
    /// Wall-clock start in the project timezone reference (UTC).
    pub start: DateTime<Utc>,
    /// Wall-clock end.
    pub end: DateTime<Utc>,
    /// Booked slot ranges per resource, sorted.
    pub bookings: BTreeMap<String, Vec<SlotRange>>,
}

impl TaskSchedule {
    /// Total booked slots across all resources.
    pub fn booked_slots(&self) -> usize {
        self.bookings
            .values()
            .flat_map(|ranges| ranges.iter())
            .map(SlotRange::len)
            .sum()
    }

    /// Booked slots on one resource.
    pub fn booked_slots_on(&self, resource_id: &str) -> usize {
        self.bookings
            .get(resource_id)
            .map(|ranges| ranges.iter().map(SlotRange::len).sum())
            .unwrap_or(0)
    }
}

/// Usage summary for one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Total slots booked on the resource.
    pub booked_slots: usize,
    /// Total slots reserved (bookings, duration/length placements).
    pub reserved_slots: usize,
    /// Earliest booked slot, if any work landed on the resource.
    pub first_booked_slot: Option<usize>,
    /// Latest booked slot.
    pub last_booked_slot: Option<usize>,
}

/// A complete schedule: the engine's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Per-task placements, keyed by task id.
    pub tasks: BTreeMap<String, TaskSchedule>,
    /// Per-resource usage summaries, keyed by resource id.
    pub resources: BTreeMap<String, ResourceUsage>,
    /// Slot width in seconds, copied from the project.
    pub resolution_seconds: u32,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new(resolution_seconds: u32) -> Self {
        Self {
            tasks: BTreeMap::new(),
            resources: BTreeMap::new(),
            resolution_seconds,
        }
    }

    /// The placement of one task.
    pub fn task(&self, task_id: &str) -> Option<&TaskSchedule> {
        self.tasks.get(task_id)
    }

    /// Usage of one resource.
    pub fn resource(&self, resource_id: &str) -> Option<&ResourceUsage> {
        self.resources.get(resource_id)
    }

    /// Latest end slot across all tasks.
    pub fn makespan_slot(&self) -> usize {
        self.tasks.values().map(|t| t.end_slot).max().unwrap_or(0)
    }

    /// Latest wall-clock end across all tasks.
    pub fn makespan(&self) -> Option<DateTime<Utc>> {
        self.tasks.values().map(|t| t.end).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_task_schedule(id: &str, start_slot: usize, end_slot: usize) -> TaskSchedule {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TaskSchedule {
            task_id: id.into(),
            start_slot,
            end_slot,
            start: base + chrono::Duration::hours(start_slot as i64),
            end: base + chrono::Duration::hours(end_slot as i64),
            bookings: BTreeMap::new(),
        }
    }

    #[test]
    fn test_slot_range() {
        let r = SlotRange::new(3, 7);
        assert_eq!(r.len(), 4);
        assert!(!r.is_empty());
        assert!(SlotRange::new(5, 5).is_empty());
    }

    #[test]
    fn test_booked_slot_counts() {
        let mut ts = make_task_schedule("t", 9, 17);
        ts.bookings.insert(
            "dev1".into(),
            vec![SlotRange::new(9, 12), SlotRange::new(13, 17)],
        );
        ts.bookings.insert("dev2".into(), vec![SlotRange::new(9, 10)]);

        assert_eq!(ts.booked_slots_on("dev1"), 7);
        assert_eq!(ts.booked_slots_on("dev2"), 1);
        assert_eq!(ts.booked_slots_on("absent"), 0);
        assert_eq!(ts.booked_slots(), 8);
    }

    #[test]
    fn test_makespan() {
        let mut s = Schedule::new(3600);
        s.tasks.insert("a".into(), make_task_schedule("a", 9, 17));
        s.tasks.insert("b".into(), make_task_schedule("b", 10, 20));
        assert_eq!(s.makespan_slot(), 20);
        assert_eq!(s.makespan(), Some(s.tasks["b"].end));
    }

    #[test]
    fn test_deterministic_serialization() {
        let mut s = Schedule::new(3600);
        s.tasks.insert("b".into(), make_task_schedule("b", 1, 2));
        s.tasks.insert("a".into(), make_task_schedule("a", 0, 1));

        let json1 = serde_json::to_string(&s);
        let json2 = serde_json::to_string(&s);
        // BTreeMap keys serialize in order, so equal schedules render
        // byte-identically
        assert_eq!(json1.unwrap_or_default(), json2.unwrap_or_default());
    }
}
