//! Compiled process templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::graph::{ProcessGraph, TaskType};

// ---------------------------------------------------------------------------
// TaskTemplateId
// ---------------------------------------------------------------------------

/// Id of a compiled task, equal to the id of the task node it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskTemplateId(pub String);

impl TaskTemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskTemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskTemplateId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// PredecessorMode
// ---------------------------------------------------------------------------

/// How the fan-out instances of one predecessor template count as satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredecessorMode {
    /// Every instance of the predecessor is completed or skipped.
    #[default]
    All,
    /// At least one instance of the predecessor is completed.
    Any,
}

impl std::fmt::Display for PredecessorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskTemplate
// ---------------------------------------------------------------------------

/// One compiled task with explicit dependency declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: TaskTemplateId,
    pub name: String,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_hint: Option<String>,
    /// Ordered set of upstream task ids. Comma-separated on the wire.
    #[serde(default, with = "predecessor_list")]
    pub predecessor_ids: Vec<TaskTemplateId>,
    #[serde(default)]
    pub predecessor_mode: PredecessorMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_offset_days: Option<u32>,
    /// Compile order; display only.
    #[serde(default)]
    pub order_hint: u32,
}

impl TaskTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TaskTemplateId::new(id),
            name: name.into(),
            task_type: TaskType::Task,
            stage_label: None,
            description: None,
            assignee_hint: None,
            predecessor_ids: Vec::new(),
            predecessor_mode: PredecessorMode::All,
            deadline_offset_days: None,
            order_hint: 0,
        }
    }

    pub fn after(mut self, predecessors: &[&str]) -> Self {
        self.predecessor_ids = predecessors.iter().map(|p| TaskTemplateId::from(*p)).collect();
        self
    }

    pub fn with_mode(mut self, mode: PredecessorMode) -> Self {
        self.predecessor_mode = mode;
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_deadline_days(mut self, days: u32) -> Self {
        self.deadline_offset_days = Some(days);
        self
    }

    pub fn has_predecessors(&self) -> bool {
        !self.predecessor_ids.is_empty()
    }
}

/// Wire form of predecessor lists: `"a,b,c"`. A JSON array is accepted on input.
mod predecessor_list {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TaskTemplateId;

    pub fn serialize<S: Serializer>(ids: &[TaskTemplateId], s: S) -> Result<S::Ok, S::Error> {
        let joined = ids.iter().map(TaskTemplateId::as_str).collect::<Vec<_>>().join(",");
        s.serialize_str(&joined)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<TaskTemplateId>, D::Error> {
        let parts = match Raw::deserialize(d)? {
            Raw::Joined(s) => s.split(',').map(str::to_owned).collect(),
            Raw::List(items) => items,
        };
        Ok(parts
            .into_iter()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .map(TaskTemplateId)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ProcessTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateType {
    /// Run again and again (monthly close, onboarding, ...).
    #[default]
    Recurring,
    /// One-off project plan.
    Project,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recurring => write!(f, "RECURRING"),
            Self::Project => write!(f, "PROJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// The compiled, persisted unit that instances are started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTemplate {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub template_type: TemplateType,
    pub tasks: Vec<TaskTemplate>,
    /// The diagram the tasks were compiled from, kept for re-editing.
    #[serde(default)]
    pub graph: ProcessGraph,
    #[serde(default)]
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessTemplate {
    pub fn task(&self, id: &TaskTemplateId) -> Option<&TaskTemplate> {
        self.tasks.iter().find(|t| &t.id == id)
    }
}

/// What a template author submits on save.
///
/// `graph` is compiled when present. `tasks` carries hand-edited predecessor
/// lists; on its own it is taken as the task set, alongside a graph it
/// overrides the compiled dependencies of matching task ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    /// Set when updating an existing template.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub template_type: TemplateType,
    #[serde(default)]
    pub graph: Option<ProcessGraph>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskTemplate>>,
    #[serde(default)]
    pub visibility: Visibility,
}
