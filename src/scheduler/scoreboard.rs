//! Per-resource slot scoreboard.
//!
//! One dense array per leaf resource, indexed by slot. Each cell is a
//! fixed-width 8-byte value: a state tag in the low byte and a 56-bit
//! payload carrying a task index (`Booked`/`Reserved`) or a block
//! reason (`Blocked`). Reads are constant time; range writes are O(k).
//!
//! The allocator's primary query is [`Scoreboard::collect_intervals`]:
//! extract maximal runs of slots matching a predicate inside a window,
//! discarding runs shorter than a minimum length.

use crate::models::{LeaveKind, SlotRange};

/// Dense task index used inside the engine (not the model-level id).
pub type TaskIdx = u32;

const STATE_FREE: u8 = 0;
const STATE_OFF_DUTY: u8 = 1;
const STATE_BOOKED: u8 = 2;
const STATE_RESERVED: u8 = 3;
const STATE_BLOCKED: u8 = 4;

/// Decoded state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Working time, nothing placed.
    Free,
    /// Outside the resource's working hours.
    OffDuty,
    /// Booked by a task through the allocator.
    Booked(TaskIdx),
    /// Reserved: explicit booking or a duration/length placement.
    /// Reservations cannot be evicted by preemption.
    Reserved(TaskIdx),
    /// Off-duty with a recorded reason (leave).
    Blocked(LeaveKind),
}

/// Packed 8-byte scoreboard cell: low byte state, upper 56 bits
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCell(u64);

impl SlotCell {
    /// The free-and-working cell.
    pub const FREE: Self = Self(STATE_FREE as u64);
    /// The plain off-duty cell.
    pub const OFF_DUTY: Self = Self(STATE_OFF_DUTY as u64);

    /// Encodes a booked cell.
    #[inline]
    pub fn booked(task: TaskIdx) -> Self {
        Self(STATE_BOOKED as u64 | (u64::from(task) << 8))
    }

    /// Encodes a reserved cell.
    #[inline]
    pub fn reserved(task: TaskIdx) -> Self {
        Self(STATE_RESERVED as u64 | (u64::from(task) << 8))
    }

    /// Encodes a blocked cell with its leave reason.
    #[inline]
    pub fn blocked(reason: LeaveKind) -> Self {
        Self(STATE_BLOCKED as u64 | ((reason as u64) << 8))
    }

    #[inline]
    fn tag(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    #[inline]
    fn payload(self) -> u64 {
        self.0 >> 8
    }

    /// Decodes the cell.
    pub fn state(self) -> SlotState {
        match self.tag() {
            STATE_FREE => SlotState::Free,
            STATE_OFF_DUTY => SlotState::OffDuty,
            STATE_BOOKED => SlotState::Booked(self.payload() as TaskIdx),
            STATE_RESERVED => SlotState::Reserved(self.payload() as TaskIdx),
            _ => SlotState::Blocked(decode_leave(self.payload())),
        }
    }

    /// Whether the cell is free working time.
    #[inline]
    pub fn is_free(self) -> bool {
        self.tag() == STATE_FREE
    }

    /// Whether the cell holds no placement (free, off-duty, or
    /// blocked). Duration placements scan with this: they ignore
    /// calendars but may not overlap bookings or reservations.
    #[inline]
    pub fn is_unoccupied(self) -> bool {
        matches!(self.tag(), STATE_FREE | STATE_OFF_DUTY | STATE_BLOCKED)
    }

    /// The booking task index, if the cell is `Booked`.
    #[inline]
    pub fn booked_task(self) -> Option<TaskIdx> {
        (self.tag() == STATE_BOOKED).then(|| self.payload() as TaskIdx)
    }
}

fn decode_leave(payload: u64) -> LeaveKind {
    match payload {
        1 => LeaveKind::Holiday,
        2 => LeaveKind::Sick,
        3 => LeaveKind::Special,
        4 => LeaveKind::Unpaid,
        5 => LeaveKind::Annual,
        _ => LeaveKind::Project,
    }
}

/// Inlined predicate tag for scoreboard scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPredicate {
    /// Slot holds no placement (calendar state ignored).
    Unoccupied,
    /// Slot is free working time.
    FreeAndWorking,
    /// Slot is booked by the given task.
    MatchingTask(TaskIdx),
}

impl SlotPredicate {
    /// Evaluates the predicate against a cell.
    #[inline]
    pub fn matches(self, cell: SlotCell) -> bool {
        match self {
            Self::Unoccupied => cell.is_unoccupied(),
            Self::FreeAndWorking => cell.is_free(),
            Self::MatchingTask(task) => cell.booked_task() == Some(task),
        }
    }
}

/// Dense per-resource slot array.
#[derive(Debug, Clone)]
pub struct Scoreboard {
    cells: Vec<SlotCell>,
}

impl Scoreboard {
    /// Creates a scoreboard of `size` slots, all free.
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![SlotCell::FREE; size],
        }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the board has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell at `idx`.
    #[inline]
    pub fn get(&self, idx: usize) -> SlotCell {
        self.cells[idx]
    }

    /// Overwrites the cell at `idx`.
    #[inline]
    pub fn set(&mut self, idx: usize, cell: SlotCell) {
        self.cells[idx] = cell;
    }

    /// Overwrites a half-open range of cells.
    pub fn fill(&mut self, range: SlotRange, cell: SlotCell) {
        let end = range.end.min(self.cells.len());
        for idx in range.start..end {
            self.cells[idx] = cell;
        }
    }

    /// Collects maximal runs of slots matching `predicate` within
    /// `[s_idx, e_idx]`, discarding runs shorter than `min_len` slots.
    ///
    /// The scan is widened by `min_len` on both sides so a run
    /// straddling the window boundary is measured at full length; the
    /// returned ranges are clamped back to the window. Ranges are
    /// half-open: the end is the first non-matching slot after the
    /// run.
    pub fn collect_intervals(
        &self,
        s_idx: usize,
        e_idx: usize,
        predicate: SlotPredicate,
        min_len: usize,
    ) -> Vec<SlotRange> {
        let min_len = min_len.max(1);
        let last = self.cells.len().saturating_sub(1);
        let e_idx = e_idx.min(last);
        let scan_start = s_idx.saturating_sub(min_len);
        let scan_end = (e_idx + min_len).min(last);

        let mut intervals = Vec::new();
        let mut run_start: Option<usize> = None;

        for idx in scan_start..=scan_end {
            // The widened end slot acts as a terminator even if it
            // matches, mirroring the window clamp below.
            let matches = idx < scan_end && predicate.matches(self.cells[idx]);
            if matches {
                run_start.get_or_insert(idx);
            } else if let Some(start) = run_start.take() {
                if idx - start >= min_len {
                    let lo = start.max(s_idx);
                    let hi = idx.min(e_idx);
                    if hi > lo {
                        intervals.push(SlotRange::new(lo, hi));
                    }
                }
            }
        }

        intervals
    }

    /// Books a set of slots for a task. Callers have already verified
    /// the slots are free.
    pub fn book_slots(&mut self, slots: &[usize], task: TaskIdx) {
        for &idx in slots {
            self.cells[idx] = SlotCell::booked(task);
        }
    }

    /// Releases every slot booked by `task` back to free, returning
    /// the released indices in order.
    pub fn unbook_task(&mut self, task: TaskIdx) -> Vec<usize> {
        let mut released = Vec::new();
        for (idx, cell) in self.cells.iter_mut().enumerate() {
            if cell.booked_task() == Some(task) {
                *cell = SlotCell::FREE;
                released.push(idx);
            }
        }
        released
    }

    /// Counts free working slots in `[s_idx, e_idx)`.
    pub fn free_slots(&self, s_idx: usize, e_idx: usize) -> usize {
        self.range(s_idx, e_idx).filter(|c| c.is_free()).count()
    }

    /// Counts booked slots in `[s_idx, e_idx)`, optionally for one
    /// task only.
    pub fn booked_slots(&self, s_idx: usize, e_idx: usize, task: Option<TaskIdx>) -> usize {
        self.range(s_idx, e_idx)
            .filter(|c| match (c.booked_task(), task) {
                (Some(t), Some(want)) => t == want,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .count()
    }

    /// Counts work slots (free or booked) in `[s_idx, e_idx)`.
    pub fn work_slots(&self, s_idx: usize, e_idx: usize) -> usize {
        self.range(s_idx, e_idx)
            .filter(|c| c.is_free() || c.booked_task().is_some())
            .count()
    }

    /// Collapses the slots booked by `task` into sorted half-open
    /// ranges.
    pub fn booked_ranges(&self, task: TaskIdx) -> Vec<SlotRange> {
        let mut ranges: Vec<SlotRange> = Vec::new();
        for (idx, cell) in self.cells.iter().enumerate() {
            if cell.booked_task() == Some(task) {
                match ranges.last_mut() {
                    Some(last) if last.end == idx => last.end = idx + 1,
                    _ => ranges.push(SlotRange::new(idx, idx + 1)),
                }
            }
        }
        ranges
    }

    fn range(&self, s_idx: usize, e_idx: usize) -> impl Iterator<Item = SlotCell> + '_ {
        let e_idx = e_idx.min(self.cells.len());
        self.cells[s_idx.min(e_idx)..e_idx].iter().copied()
    }
}
