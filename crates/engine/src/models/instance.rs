//! Running process instances and their task instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::graph::TaskType;
use super::template::TaskTemplateId;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Active,
    Suspended,
    Aborted,
    Completed,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Completed)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Aborted => write!(f, "aborted"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active"    => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "aborted"   => Ok(Self::Aborted),
            "completed" => Ok(Self::Completed),
            other       => Err(format!("unknown instance status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    /// Waiting on predecessor tasks.
    ChainWait,
    Ready,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    /// Completed and Skipped are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::ChainWait => write!(f, "chain_wait"),
            Self::Ready => write!(f, "ready"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// How an instance is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    /// Reversible freeze.
    Suspended,
    /// Terminal.
    Aborted,
}

impl std::fmt::Display for StopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suspended => write!(f, "suspended"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleAction {
    Started,
    Suspended,
    Aborted,
    Resumed,
    Completed,
}

/// One line of an instance's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEntry {
    pub at: DateTime<Utc>,
    pub action: LifecycleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub title: String,
    pub status: InstanceStatus,
    pub start_at: DateTime<Utc>,
    /// Committed completion target, fixed at start.
    pub expected_end_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub started_by_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mold_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_model_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_type: Option<StopType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<LifecycleEntry>,
}

// ---------------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------------

/// One unit of work for one assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub id: Uuid,
    pub process_instance_id: Uuid,
    /// Join key back to the frozen template snapshot.
    pub task_template_id: TaskTemplateId,
    pub name: String,
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_label: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub planned_start_at: Option<DateTime<Utc>>,
    pub planned_end_at: Option<DateTime<Utc>>,
    pub actual_start_at: Option<DateTime<Utc>>,
    pub actual_end_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One assignee for one task template. Repeat the template id to fan out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_template_id: TaskTemplateId,
    pub assignee_id: String,
}

/// Schedule overrides for one task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub task_template_id: TaskTemplateId,
    #[serde(default)]
    pub planned_start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_end_at: Option<DateTime<Utc>>,
    /// Explicit deadline; wins over the computed one.
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl TaskPlan {
    /// A plan that overrides nothing yet.
    pub fn new(task_template_id: impl Into<TaskTemplateId>) -> Self {
        Self {
            task_template_id: task_template_id.into(),
            planned_start_at: None,
            planned_end_at: None,
            deadline_at: None,
        }
    }
}

/// Body of `POST /processes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub template_id: Uuid,
    pub title: String,
    pub started_by_id: String,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub mold_code: Option<String>,
    #[serde(default)]
    pub car_model_code: Option<String>,
    #[serde(default)]
    pub task_assignees: Vec<TaskAssignment>,
    #[serde(default)]
    pub task_plans: Vec<TaskPlan>,
    #[serde(default)]
    pub initiative_id: Option<String>,
}

/// Body of `POST /processes/{id}/stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub actor_id: String,
    pub stop_type: StopType,
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /processes/{id}/resume`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}
