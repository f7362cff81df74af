//! Deadline and overdue computation.
//!
//! - A task's deadline is its anchor (planned start, else instance start)
//!   plus the template's offset in days. No offset, no deadline.
//! - `expected_end_at` is fixed once at instance start and never moves when
//!   individual tasks slip.

use chrono::{DateTime, Duration, Utc};

use crate::error::EngineError;
use crate::models::{InstanceStatus, ProcessInstance, TaskInstance, TaskTemplate};

/// Largest offset a template may carry, roughly a century.
pub const MAX_DEADLINE_OFFSET_DAYS: u32 = 36_500;

/// `anchor + offset_days`, or `None` when the template sets no offset.
///
/// # Errors
/// [`EngineError::Validation`] when the sum falls outside the representable
/// date range.
pub fn deadline_for(
    anchor: DateTime<Utc>,
    offset_days: Option<u32>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let Some(days) = offset_days else {
        return Ok(None);
    };
    anchor
        .checked_add_signed(Duration::days(i64::from(days)))
        .map(Some)
        .ok_or_else(|| {
            EngineError::Validation(format!("deadline {days} days after {anchor} is out of range"))
        })
}

/// `start_at + max(offset)` over all templates; `None` when none has an offset.
///
/// # Errors
/// See [`deadline_for`].
pub fn expected_end(
    start_at: DateTime<Utc>,
    templates: &[TaskTemplate],
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let longest = templates.iter().filter_map(|t| t.deadline_offset_days).max();
    deadline_for(start_at, longest)
}

/// Past its deadline and still open.
pub fn is_overdue(task: &TaskInstance, now: DateTime<Utc>) -> bool {
    !task.status.is_terminal() && task.deadline_at.is_some_and(|deadline| now > deadline)
}

/// Any open task overdue, or an active instance past its committed end.
pub fn is_delayed(instance: &ProcessInstance, tasks: &[TaskInstance], now: DateTime<Utc>) -> bool {
    let past_commitment = instance.status == InstanceStatus::Active
        && instance.expected_end_at.is_some_and(|end| now > end);

    past_commitment || tasks.iter().any(|t| is_overdue(t, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskStatus, TaskTemplateId, TaskType};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn task(status: TaskStatus, deadline_at: Option<DateTime<Utc>>) -> TaskInstance {
        TaskInstance {
            id: Uuid::new_v4(),
            process_instance_id: Uuid::new_v4(),
            task_template_id: TaskTemplateId::from("a"),
            name: "A".into(),
            task_type: TaskType::Task,
            stage_label: None,
            status,
            assignee_id: None,
            assignee_name: None,
            organization: None,
            planned_start_at: Some(t0()),
            planned_end_at: None,
            actual_start_at: None,
            actual_end_at: None,
            deadline_at,
        }
    }

    #[test]
    fn overdue_after_offset_days_only() {
        let ready = task(TaskStatus::Ready, deadline_for(t0(), Some(2)).unwrap());

        assert!(is_overdue(&ready, t0() + Duration::days(3)));
        assert!(!is_overdue(&ready, t0() + Duration::days(1)));
        // Exactly at the deadline is not yet late.
        assert!(!is_overdue(&ready, t0() + Duration::days(2)));
    }

    #[test]
    fn terminal_tasks_are_never_overdue() {
        let late = t0() + Duration::days(30);
        for status in [TaskStatus::Completed, TaskStatus::Skipped] {
            let deadline = deadline_for(t0(), Some(1)).unwrap();
            assert!(!is_overdue(&task(status, deadline), late));
        }
    }

    #[test]
    fn no_offset_means_no_deadline() {
        assert_eq!(deadline_for(t0(), None).unwrap(), None);
        assert!(!is_overdue(&task(TaskStatus::InProgress, None), t0() + Duration::days(365)));
    }

    #[test]
    fn expected_end_uses_longest_offset() {
        let templates = vec![
            TaskTemplate::new("a", "A").with_deadline_days(2),
            TaskTemplate::new("b", "B").with_deadline_days(5),
            TaskTemplate::new("c", "C"),
        ];
        assert_eq!(expected_end(t0(), &templates).unwrap(), Some(t0() + Duration::days(5)));
        assert_eq!(expected_end(t0(), &[TaskTemplate::new("c", "C")]).unwrap(), None);
    }

    #[test]
    fn offset_past_the_calendar_is_an_error() {
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert!(matches!(
            deadline_for(near_end, Some(2)),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            deadline_for(t0(), Some(u32::MAX)),
            Err(EngineError::Validation(_))
        ));
        assert!(deadline_for(t0(), Some(MAX_DEADLINE_OFFSET_DAYS)).unwrap().is_some());
    }
}
