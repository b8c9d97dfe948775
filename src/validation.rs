//! Input validation for project models.
//!
//! Checks structural integrity before scheduling touches a
//! scoreboard. Detects:
//! - Duplicate task/resource/shift IDs
//! - Dangling references (allocations, shifts, dependencies, parents,
//!   bookings)
//! - Conflicting anchors and zero demands
//! - Overlapping working-hour intervals
//!
//! All problems are accumulated and reported together; the driver
//! converts a non-empty report into `SchedulerError::InvalidModel`.

use std::collections::HashSet;

use crate::models::{Demand, Project};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// A reference names an entity that does not exist.
    UnknownReference,
    /// A reference names an entity of the wrong shape (e.g. an
    /// allocation naming a container resource).
    InvalidReference,
    /// Anchors contradict each other.
    ConflictingAnchors,
    /// A weekly template has overlapping intervals.
    OverlappingIntervals,
    /// A numeric field is out of its legal range.
    InvalidValue,
    /// A leaf demands work but has nowhere to put it, or a container
    /// carries a demand.
    InvalidDemand,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates a project model.
///
/// Checks:
/// 1. Unique task, resource, and shift IDs
/// 2. A positive resolution dividing the hour, and `start < end`
/// 3. Parent, shift, allocation, dependency, and booking references
/// 4. Allocations and bookings naming leaf resources / leaf tasks
/// 5. Anchor consistency (`start < end`, `min_start <= max_end`)
/// 6. Non-zero demands on leaves, no demands on containers, and an
///    allocation for every effort demand
/// 7. Non-overlapping weekly template intervals everywhere
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with every detected
/// issue.
pub fn validate_project(project: &Project) -> ValidationResult {
    use ValidationErrorKind::*;
    let mut errors = Vec::new();

    // Horizon and resolution
    if project.start >= project.end {
        errors.push(ValidationError::new(
            ConflictingAnchors,
            format!(
                "project end {} is not after start {}",
                project.end, project.start
            ),
        ));
    }
    if project.resolution_seconds == 0 || 3600 % project.resolution_seconds.max(1) != 0 {
        errors.push(ValidationError::new(
            InvalidValue,
            format!(
                "timing resolution {}s is not a positive divisor of 3600",
                project.resolution_seconds
            ),
        ));
    }

    // Unique ids
    let mut task_ids = HashSet::new();
    for t in &project.tasks {
        if !task_ids.insert(t.id.as_str()) {
            errors.push(ValidationError::new(
                DuplicateId,
                format!("duplicate task ID: {}", t.id),
            ));
        }
    }
    let mut resource_ids = HashSet::new();
    for r in &project.resources {
        if !resource_ids.insert(r.id.as_str()) {
            errors.push(ValidationError::new(
                DuplicateId,
                format!("duplicate resource ID: {}", r.id),
            ));
        }
    }
    let mut shift_ids = HashSet::new();
    for s in &project.shifts {
        if !shift_ids.insert(s.id.as_str()) {
            errors.push(ValidationError::new(
                DuplicateId,
                format!("duplicate shift ID: {}", s.id),
            ));
        }
    }

    // Weekly templates
    check_template(&project.working_hours, "project", &mut errors);
    for s in &project.shifts {
        check_template(&s.template, &format!("shift '{}'", s.id), &mut errors);
    }

    // Resources
    for r in &project.resources {
        if let Some(parent) = &r.parent {
            if !resource_ids.contains(parent.as_str()) {
                errors.push(ValidationError::new(
                    UnknownReference,
                    format!("resource '{}' has unknown parent '{parent}'", r.id),
                ));
            }
        }
        if let Some(shift) = &r.shift {
            if !shift_ids.contains(shift.as_str()) {
                errors.push(ValidationError::new(
                    UnknownReference,
                    format!("resource '{}' references unknown shift '{shift}'", r.id),
                ));
            }
        }
        if let Some(template) = &r.working_hours {
            check_template(template, &format!("resource '{}'", r.id), &mut errors);
        }
    }

    // Tasks
    for t in &project.tasks {
        let is_leaf = project.is_leaf_task(&t.id);

        if let Some(parent) = &t.parent {
            if !task_ids.contains(parent.as_str()) {
                errors.push(ValidationError::new(
                    UnknownReference,
                    format!("task '{}' has unknown parent '{parent}'", t.id),
                ));
            }
        }

        if let (Some(start), Some(end)) = (t.start, t.end) {
            if start > end {
                errors.push(ValidationError::new(
                    ConflictingAnchors,
                    format!("task '{}' has start {start} after end {end}", t.id),
                ));
            }
        }
        if let (Some(min_start), Some(max_end)) = (t.min_start, t.max_end) {
            if min_start > max_end {
                errors.push(ValidationError::new(
                    ConflictingAnchors,
                    format!("task '{}' has min_start after max_end", t.id),
                ));
            }
        }

        match t.demand {
            Some(_) if !is_leaf => {
                errors.push(ValidationError::new(
                    InvalidDemand,
                    format!("container task '{}' cannot carry a demand", t.id),
                ));
            }
            Some(demand) if demand.slots() == 0 => {
                errors.push(ValidationError::new(
                    InvalidValue,
                    format!("task '{}' has a zero demand", t.id),
                ));
            }
            Some(Demand::Effort(_)) if t.allocations.is_empty() => {
                errors.push(ValidationError::new(
                    InvalidDemand,
                    format!("effort task '{}' has no allocation", t.id),
                ));
            }
            _ => {}
        }

        for group in &t.allocations {
            for id in group.resources.iter().chain(&group.alternatives) {
                if !resource_ids.contains(id.as_str()) {
                    errors.push(ValidationError::new(
                        UnknownReference,
                        format!("task '{}' allocates unknown resource '{id}'", t.id),
                    ));
                } else if !project.is_leaf_resource(id) {
                    errors.push(ValidationError::new(
                        InvalidReference,
                        format!("task '{}' allocates container resource '{id}'", t.id),
                    ));
                }
            }
        }

        for edge in t.depends.iter().chain(&t.precedes) {
            if !task_ids.contains(edge.source.as_str()) {
                errors.push(ValidationError::new(
                    UnknownReference,
                    format!("task '{}' depends on unknown task '{}'", t.id, edge.source),
                ));
            } else if edge.source == t.id {
                errors.push(ValidationError::new(
                    InvalidReference,
                    format!("task '{}' depends on itself", t.id),
                ));
            }
            if let Some(max_gap) = edge.max_gap {
                if max_gap < edge.gap {
                    errors.push(ValidationError::new(
                        ConflictingAnchors,
                        format!(
                            "task '{}': max gap {max_gap} is below gap {} on edge from '{}'",
                            t.id, edge.gap, edge.source
                        ),
                    ));
                }
            }
        }
    }

    // Bookings
    for b in &project.bookings {
        if !resource_ids.contains(b.resource_id.as_str()) {
            errors.push(ValidationError::new(
                UnknownReference,
                format!("booking references unknown resource '{}'", b.resource_id),
            ));
        } else if !project.is_leaf_resource(&b.resource_id) {
            errors.push(ValidationError::new(
                InvalidReference,
                format!("booking references container resource '{}'", b.resource_id),
            ));
        }
        if !task_ids.contains(b.task_id.as_str()) {
            errors.push(ValidationError::new(
                UnknownReference,
                format!("booking references unknown task '{}'", b.task_id),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_template(
    template: &crate::models::WeeklyTemplate,
    owner: &str,
    errors: &mut Vec<ValidationError>,
) {
    for weekday in 0..7 {
        if let Some((a, b)) = template.find_overlap(weekday) {
            errors.push(ValidationError::new(
                ValidationErrorKind::OverlappingIntervals,
                format!(
                    "{owner}: overlapping intervals on weekday {weekday} \
                     ({}-{} and {}-{})",
                    a.start_min, a.end_min, b.start_min, b.end_min
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationGroup, DependencyEdge, Interval, Resource, Task, WeeklyTemplate};
    use chrono::{TimeZone, Utc};

    fn base_project() -> Project {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        Project::new("p", start, end)
    }

    fn kinds(result: ValidationResult) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_project_passes() {
        let p = base_project()
            .with_resource(Resource::new("dev"))
            .with_task(Task::new("t").with_effort(8).allocate("dev"));
        assert!(validate_project(&p).is_ok());
    }

    #[test]
    fn test_duplicate_ids() {
        let p = base_project()
            .with_task(Task::new("t").with_effort(1))
            .with_task(Task::new("t").with_effort(1));
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn test_unknown_allocation() {
        let p = base_project().with_task(Task::new("t").with_effort(8).allocate("ghost"));
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::UnknownReference));
    }

    #[test]
    fn test_container_allocation_rejected() {
        let p = base_project()
            .with_resource(Resource::new("team"))
            .with_resource(Resource::new("dev").with_parent("team"))
            .with_task(Task::new("t").with_effort(8).allocate("team"));
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::InvalidReference));
    }

    #[test]
    fn test_effort_without_allocation() {
        let p = base_project().with_task(Task::new("t").with_effort(8));
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::InvalidDemand));
    }

    #[test]
    fn test_container_with_demand() {
        let p = base_project()
            .with_resource(Resource::new("dev"))
            .with_task(Task::new("phase").with_effort(8).allocate("dev"))
            .with_task(Task::new("child").with_parent("phase").with_effort(1).allocate("dev"));
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::InvalidDemand));
    }

    #[test]
    fn test_conflicting_anchors() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let p = base_project().with_task(
            Task::new("t")
                .with_effort(1)
                .allocate("x")
                .with_start(start)
                .with_end(end),
        );
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::ConflictingAnchors));
    }

    #[test]
    fn test_self_dependency() {
        let p = base_project()
            .with_resource(Resource::new("dev"))
            .with_task(
                Task::new("t")
                    .with_effort(1)
                    .allocate("dev")
                    .depends_on("t"),
            );
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::InvalidReference));
    }

    #[test]
    fn test_max_gap_below_gap() {
        let p = base_project()
            .with_resource(Resource::new("dev"))
            .with_task(Task::new("a").with_effort(1).allocate("dev"))
            .with_task(
                Task::new("b").with_effort(1).allocate("dev").with_dependency(
                    DependencyEdge::new("a").with_gap(5).with_max_gap(2),
                ),
            );
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::ConflictingAnchors));
    }

    #[test]
    fn test_overlapping_template_intervals() {
        let p = base_project().with_working_hours(
            WeeklyTemplate::new()
                .with_day(0, vec![Interval::hours(8, 12), Interval::hours(10, 14)]),
        );
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::OverlappingIntervals));
    }

    #[test]
    fn test_bad_resolution() {
        let p = base_project().with_resolution(7000);
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::InvalidValue));
    }

    #[test]
    fn test_alternatives_are_checked() {
        let p = base_project()
            .with_resource(Resource::new("dev"))
            .with_task(
                Task::new("t")
                    .with_effort(1)
                    .with_allocation(AllocationGroup::new("dev").with_alternative("ghost")),
            );
        assert!(kinds(validate_project(&p)).contains(&ValidationErrorKind::UnknownReference));
    }
}
