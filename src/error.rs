//! Scheduling error taxonomy.
//!
//! Every failure mode of the engine maps to one [`SchedulerError`]
//! variant carrying the offending entity and a minimal context
//! (window, bounds, resource). All errors are fatal: the engine never
//! emits a partial schedule.

use thiserror::Error;

/// Result alias for scheduling operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while building or running a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A time input is out of range or not aligned to the grid.
    #[error("invalid time: {reason}")]
    InvalidTime {
        /// What was wrong with the input.
        reason: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected involving task '{task_id}'")]
    CycleDetected {
        /// A task on the cycle.
        task_id: String,
    },

    /// Constraint propagation left a task with an empty window.
    #[error("task '{task_id}' is unsatisfiable: lower bound {lb} exceeds upper bound {ub}")]
    Unsatisfiable {
        /// The task whose window collapsed.
        task_id: String,
        /// Lower bound (slot index).
        lb: usize,
        /// Upper bound (slot index).
        ub: usize,
    },

    /// No resource, including alternatives, can supply the demand.
    #[error("no resource can supply task '{task_id}' within slots [{lb}, {ub})")]
    NoResource {
        /// The unplaceable task.
        task_id: String,
        /// Window lower bound.
        lb: usize,
        /// Window upper bound.
        ub: usize,
    },

    /// A contiguous task is larger than any free working run.
    #[error(
        "task '{task_id}' needs {demand} contiguous slots on '{resource_id}' \
         but the longest free run has {longest}"
    )]
    OverCapacity {
        /// The contiguous task.
        task_id: String,
        /// The resource that was scanned.
        resource_id: String,
        /// Slots demanded.
        demand: usize,
        /// Longest free run found.
        longest: usize,
    },

    /// An anchored task demands more than its limits allow in the window.
    #[error("task '{task_id}' exceeds limit '{limit}' on resource '{resource_id}'")]
    LimitExceeded {
        /// The task that hit the cap.
        task_id: String,
        /// The resource carrying the limit.
        resource_id: String,
        /// The limit kind that was exhausted ("dailymax", "weeklymax", ...).
        limit: String,
    },

    /// The fixed-point driver reached its round cap without converging.
    #[error("scheduling did not converge after {rounds} rounds")]
    Nonconvergent {
        /// Rounds executed before giving up.
        rounds: usize,
    },

    /// The input model is structurally invalid.
    #[error("invalid model: {reason}")]
    InvalidModel {
        /// First detected problem; validation reports the rest.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SchedulerError::Unsatisfiable {
            task_id: "t1".into(),
            lb: 10,
            ub: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("t1"));
        assert!(msg.contains("10"));
        assert!(msg.contains("5"));
    }

    #[test]
    fn test_error_equality() {
        let a = SchedulerError::Nonconvergent { rounds: 8 };
        let b = SchedulerError::Nonconvergent { rounds: 8 };
        assert_eq!(a, b);
    }
}
