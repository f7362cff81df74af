//! Read-only progress rollups over process runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deadline::{is_delayed, is_overdue};
use crate::models::{TaskInstance, TaskStatus};
use crate::state_machine::ProcessRun;

/// Counters for one assignee's task instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeProgress {
    /// `None` for unassigned instances.
    pub assignee_id: Option<String>,
    pub assignee_name: Option<String>,
    pub organization: Option<String>,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub in_progress: usize,
    pub ready: usize,
    pub waiting: usize,
    pub overdue: usize,
}

impl AssigneeProgress {
    fn record(&mut self, task: &TaskInstance, now: DateTime<Utc>) {
        self.total += 1;
        match task.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Ready => self.ready += 1,
            TaskStatus::NotStarted | TaskStatus::ChainWait => self.waiting += 1,
        }
        if is_overdue(task, now) {
            self.overdue += 1;
        }
        if self.assignee_name.is_none() {
            self.assignee_name = task.assignee_name.clone();
        }
    }

    /// Share of terminal instances, `0.0..=1.0`.
    pub fn completion_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed + self.skipped) as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationProgress {
    /// `None` groups instances whose assignee has no organization, and
    /// unassigned instances.
    pub organization: Option<String>,
    pub assignees: Vec<AssigneeProgress>,
}

/// Per-instance rollup returned alongside the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub in_progress: usize,
    pub ready: usize,
    pub waiting: usize,
    pub overdue: usize,
    pub delayed: bool,
    pub all_terminal: bool,
    pub organizations: Vec<OrganizationProgress>,
}

type GroupKey = (Option<String>, Option<String>);

fn fold<'a>(
    groups: &mut BTreeMap<GroupKey, AssigneeProgress>,
    tasks: impl IntoIterator<Item = &'a TaskInstance>,
    now: DateTime<Utc>,
) {
    for task in tasks {
        let key = (task.organization.clone(), task.assignee_id.clone());
        groups
            .entry(key)
            .or_insert_with(|| AssigneeProgress {
                assignee_id: task.assignee_id.clone(),
                organization: task.organization.clone(),
                ..AssigneeProgress::default()
            })
            .record(task, now);
    }
}

/// Fold one run into a report. Organizations and assignees come out sorted,
/// `None` first.
pub fn aggregate(run: &ProcessRun, now: DateTime<Utc>) -> ProgressReport {
    let mut groups = BTreeMap::new();
    fold(&mut groups, run.tasks(), now);

    let mut totals = AssigneeProgress::default();
    let mut organizations: Vec<OrganizationProgress> = Vec::new();

    for ((organization, _), progress) in groups {
        totals.total += progress.total;
        totals.completed += progress.completed;
        totals.skipped += progress.skipped;
        totals.in_progress += progress.in_progress;
        totals.ready += progress.ready;
        totals.waiting += progress.waiting;
        totals.overdue += progress.overdue;

        match organizations.last_mut() {
            Some(group) if group.organization == organization => group.assignees.push(progress),
            _ => organizations.push(OrganizationProgress {
                organization,
                assignees: vec![progress],
            }),
        }
    }

    ProgressReport {
        total: totals.total,
        completed: totals.completed,
        skipped: totals.skipped,
        in_progress: totals.in_progress,
        ready: totals.ready,
        waiting: totals.waiting,
        overdue: totals.overdue,
        delayed: is_delayed(run.instance(), run.tasks(), now),
        all_terminal: run.all_terminal(),
        organizations,
    }
}

/// Dashboard rollup: per-assignee totals across many runs.
pub fn summarize_assignees<'a>(
    runs: impl IntoIterator<Item = &'a ProcessRun>,
    now: DateTime<Utc>,
) -> Vec<AssigneeProgress> {
    let mut groups = BTreeMap::new();
    for run in runs {
        fold(&mut groups, run.tasks(), now);
    }
    groups.into_values().collect()
}
