//! Time grid: wall time ↔ slot index mapping.
//!
//! All scheduling arithmetic happens on integer slot indices at a fixed
//! resolution. Wall instants only appear at the model boundary (input
//! anchors, output rendering); no floating-point time deltas persist.
//!
//! # Rounding
//! `index()` rounds toward negative infinity; `instant()` is exact.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Maps wall time to integer slot indices at a fixed resolution.
///
/// The grid covers `[project_start, project_end]` with
/// `size = ceil((end - start) / resolution) + 1` slots. Slot `i` spans
/// `[instant(i), instant(i) + resolution)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    project_start: DateTime<Utc>,
    project_end: DateTime<Utc>,
    resolution_seconds: u32,
    size: usize,
}

impl TimeGrid {
    /// Creates a grid over `[start, end]` at the given resolution.
    ///
    /// # Errors
    /// `InvalidTime` if `end <= start`, or if `resolution_seconds` is
    /// zero or does not divide an hour evenly (calendar templates are
    /// minute-based, so the resolution must tile the day).
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution_seconds: u32,
    ) -> Result<Self> {
        if resolution_seconds == 0 || 3600 % resolution_seconds != 0 {
            return Err(SchedulerError::InvalidTime {
                reason: format!(
                    "resolution {resolution_seconds}s must be a positive divisor of 3600"
                ),
            });
        }
        if end <= start {
            return Err(SchedulerError::InvalidTime {
                reason: format!("project end {end} is not after start {start}"),
            });
        }
        let span = (end - start).num_seconds();
        let res = i64::from(resolution_seconds);
        let size = (span + res - 1) / res + 1;
        Ok(Self {
            project_start: start,
            project_end: end,
            resolution_seconds,
            size: size as usize,
        })
    }

    /// Project start instant.
    #[inline]
    pub fn project_start(&self) -> DateTime<Utc> {
        self.project_start
    }

    /// Project end instant.
    #[inline]
    pub fn project_end(&self) -> DateTime<Utc> {
        self.project_end
    }

    /// Slot width in seconds.
    #[inline]
    pub fn resolution_seconds(&self) -> u32 {
        self.resolution_seconds
    }

    /// Number of slots in the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots per hour.
    #[inline]
    pub fn slots_per_hour(&self) -> usize {
        (3600 / self.resolution_seconds) as usize
    }

    /// Converts an instant to a slot index, rounding toward negative
    /// infinity.
    ///
    /// With `clamp`, out-of-range instants map to `0` or `size - 1`.
    /// Without it, they are an `InvalidTime` error.
    pub fn index(&self, t: DateTime<Utc>, clamp: bool) -> Result<usize> {
        let secs = (t - self.project_start).num_seconds();
        let idx = secs.div_euclid(i64::from(self.resolution_seconds));
        if idx < 0 || idx >= self.size as i64 {
            if clamp {
                return Ok(if idx < 0 { 0 } else { self.size - 1 });
            }
            return Err(SchedulerError::InvalidTime {
                reason: format!(
                    "{t} is outside the project range {} - {}",
                    self.project_start, self.project_end
                ),
            });
        }
        Ok(idx as usize)
    }

    /// Converts a slot index back to its starting instant.
    ///
    /// With `clamp`, out-of-range indices map to the project start or
    /// end instant.
    pub fn instant(&self, idx: i64, clamp: bool) -> Result<DateTime<Utc>> {
        if idx < 0 || idx >= self.size as i64 {
            if clamp {
                return Ok(if idx < 0 {
                    self.project_start
                } else {
                    self.project_end
                });
            }
            return Err(SchedulerError::InvalidTime {
                reason: format!("slot index {idx} is outside [0, {})", self.size),
            });
        }
        Ok(self.project_start + Duration::seconds(idx * i64::from(self.resolution_seconds)))
    }

    /// Starting instant of an in-range slot.
    ///
    /// Infallible companion of [`instant`](Self::instant) for indices
    /// already known to be `< size`.
    #[inline]
    pub fn slot_start(&self, idx: usize) -> DateTime<Utc> {
        self.project_start + Duration::seconds(idx as i64 * i64::from(self.resolution_seconds))
    }

    /// Converts a whole number of hours to slots.
    #[inline]
    pub fn hours_to_slots(&self, hours: u32) -> usize {
        hours as usize * self.slots_per_hour()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour_grid() -> TimeGrid {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        TimeGrid::new(start, end, 3600).unwrap()
    }

    #[test]
    fn test_size() {
        // 7 days of hourly slots plus the trailing fencepost
        assert_eq!(hour_grid().size(), 7 * 24 + 1);
    }

    #[test]
    fn test_index_round_trip() {
        let grid = hour_grid();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 13, 0, 0).unwrap();
        let idx = grid.index(t, false).unwrap();
        assert_eq!(idx, 24 + 13);
        assert_eq!(grid.instant(idx as i64, false).unwrap(), t);
    }

    #[test]
    fn test_index_floors_within_slot() {
        let grid = hour_grid();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        assert_eq!(grid.index(t, false).unwrap(), 9);
    }

    #[test]
    fn test_index_clamps() {
        let grid = hour_grid();
        let before = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(grid.index(before, true).unwrap(), 0);
        assert_eq!(grid.index(after, true).unwrap(), grid.size() - 1);
        assert!(grid.index(before, false).is_err());
        assert!(grid.index(after, false).is_err());
    }

    #[test]
    fn test_instant_clamps() {
        let grid = hour_grid();
        assert_eq!(grid.instant(-5, true).unwrap(), grid.project_start());
        assert_eq!(grid.instant(10_000, true).unwrap(), grid.project_end());
        assert!(grid.instant(-1, false).is_err());
    }

    #[test]
    fn test_quarter_hour_resolution() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let grid = TimeGrid::new(start, end, 900).unwrap();
        assert_eq!(grid.slots_per_hour(), 4);
        assert_eq!(grid.size(), 96 + 1);
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 13, 45, 0).unwrap();
        assert_eq!(grid.index(t, false).unwrap(), 13 * 4 + 3);
    }

    #[test]
    fn test_bad_resolution_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(TimeGrid::new(start, end, 0).is_err());
        assert!(TimeGrid::new(start, end, 7000).is_err());
        assert!(TimeGrid::new(end, start, 3600).is_err());
    }
}
