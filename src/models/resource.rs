//! Resource model.
//!
//! Resources supply working time to tasks. Each leaf resource owns a
//! scoreboard during scheduling; container resources aggregate their
//! children's limits. Efficiency scales effort demand and is kept as an
//! exact rational so all demand arithmetic stays in integers.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 1.2

use serde::{Deserialize, Serialize};

use super::calendar::{Leave, WeeklyTemplate};

/// Work-rate multiplier as an exact rational `num / den`.
///
/// A resource with efficiency 0.5 needs twice the booked slots to
/// deliver one slot-unit of effort. Demand conversion is pure integer
/// math: `demand_slots = ceil(effort_slots * den / num)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Efficiency {
    num: u32,
    den: u32,
}

impl Efficiency {
    /// The neutral efficiency 1/1.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Creates an efficiency from a ratio, reduced to lowest terms.
    ///
    /// Returns `None` when either term is zero.
    pub fn from_ratio(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Creates an efficiency from a float, at 1/1000 precision.
    ///
    /// Returns `None` for non-positive or non-finite values.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let num = (value * 1000.0).round() as u32;
        Self::from_ratio(num, 1000)
    }

    /// Numerator of the reduced ratio.
    #[inline]
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Denominator of the reduced ratio.
    #[inline]
    pub fn den(&self) -> u32 {
        self.den
    }

    /// Slots this resource must be booked to deliver `effort_slots` of
    /// work: `ceil(effort_slots * den / num)`.
    pub fn demand_slots(&self, effort_slots: u64) -> u64 {
        let scaled = effort_slots * u64::from(self.den);
        scaled.div_ceil(u64::from(self.num))
    }
}

impl Default for Efficiency {
    fn default() -> Self {
        Self::ONE
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Allocation caps per calendar window, in slot counts.
///
/// Daily windows follow calendar days, weekly windows follow ISO weeks
/// (Monday-Sunday), monthly windows follow calendar months. Container
/// resources aggregate: a child booking counts against every ancestor's
/// caps as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSet {
    /// Maximum booked slots per calendar day.
    pub daily_max: Option<u32>,
    /// Maximum booked slots per ISO week.
    pub weekly_max: Option<u32>,
    /// Maximum booked slots per calendar month.
    pub monthly_max: Option<u32>,
}

impl LimitSet {
    /// Creates an unconstrained limit set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the daily cap.
    pub fn with_daily_max(mut self, slots: u32) -> Self {
        self.daily_max = Some(slots);
        self
    }

    /// Sets the weekly cap.
    pub fn with_weekly_max(mut self, slots: u32) -> Self {
        self.weekly_max = Some(slots);
        self
    }

    /// Sets the monthly cap.
    pub fn with_monthly_max(mut self, slots: u32) -> Self {
        self.monthly_max = Some(slots);
        self
    }

    /// Whether any cap is set.
    pub fn is_constrained(&self) -> bool {
        self.daily_max.is_some() || self.weekly_max.is_some() || self.monthly_max.is_some()
    }
}

/// A resource that can be booked by tasks.
///
/// A resource with children (linked by `parent`) is a *container*: it
/// books no time itself but aggregates its descendants' limits. Only
/// leaf resources carry scoreboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique resource identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Parent resource (container) identifier.
    pub parent: Option<String>,
    /// IANA timezone name; working hours are interpreted in this zone.
    /// `None` means the project timezone.
    pub timezone: Option<String>,
    /// Work-rate multiplier.
    pub efficiency: Efficiency,
    /// Allocation caps.
    pub limits: LimitSet,
    /// Explicit working hours. Overrides any assigned shift.
    pub working_hours: Option<WeeklyTemplate>,
    /// Assigned shift identifier. Overrides the project default hours.
    pub shift: Option<String>,
    /// Off-duty periods for this resource.
    pub leaves: Vec<Leave>,
}

impl Resource {
    /// Creates a resource with default efficiency and no overrides.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            parent: None,
            timezone: None,
            efficiency: Efficiency::ONE,
            limits: LimitSet::new(),
            working_hours: None,
            shift: None,
            leaves: Vec::new(),
        }
    }

    /// Sets the resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the parent container.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the resource timezone.
    pub fn with_timezone(mut self, zone: impl Into<String>) -> Self {
        self.timezone = Some(zone.into());
        self
    }

    /// Sets the efficiency.
    pub fn with_efficiency(mut self, efficiency: Efficiency) -> Self {
        self.efficiency = efficiency;
        self
    }

    /// Sets the allocation caps.
    pub fn with_limits(mut self, limits: LimitSet) -> Self {
        self.limits = limits;
        self
    }

    /// Sets explicit working hours.
    pub fn with_working_hours(mut self, template: WeeklyTemplate) -> Self {
        self.working_hours = Some(template);
        self
    }

    /// Assigns a named shift.
    pub fn with_shift(mut self, shift_id: impl Into<String>) -> Self {
        self.shift = Some(shift_id.into());
        self
    }

    /// Adds an off-duty period.
    pub fn with_leave(mut self, leave: Leave) -> Self {
        self.leaves.push(leave);
        self
    }
}
