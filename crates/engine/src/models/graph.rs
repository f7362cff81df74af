//! Graph model: the BPMN-lite diagram drawn in the process editor.
//!
//! The JSON shape (`{nodes: [...], edges: [...]}`) is persisted on the
//! template and handed back to the editor untouched, so every optional field
//! is skipped when absent rather than written as `null`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeKind / TaskType
// ---------------------------------------------------------------------------

/// What a graph node is. Unknown `type` strings fail to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Task,
    GatewayParallel,
    GatewayXor,
    End,
}

impl NodeKind {
    pub fn is_gateway(self) -> bool {
        matches!(self, Self::GatewayParallel | Self::GatewayXor)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Task => write!(f, "task"),
            Self::GatewayParallel => write!(f, "gateway_parallel"),
            Self::GatewayXor => write!(f, "gateway_xor"),
            Self::End => write!(f, "end"),
        }
    }
}

/// The kind of work a task node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Plain task; may be completed straight from `Ready`.
    #[default]
    Task,
    Worklog,
    Cooperation,
    Approval,
}

impl TaskType {
    /// Whether a `Ready` instance of this type may complete without a start step.
    pub fn allows_direct_completion(self) -> bool {
        matches!(self, Self::Task)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "TASK"),
            Self::Worklog => write!(f, "WORKLOG"),
            Self::Cooperation => write!(f, "COOPERATION"),
            Self::Approval => write!(f, "APPROVAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphNode / GraphEdge
// ---------------------------------------------------------------------------

/// Editor canvas coordinates. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node of the process diagram.
///
/// Task-only fields are ignored on other kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    /// Rich text, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free text resolved by the UI, not by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_offset_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl GraphNode {
    /// A bare node of the given kind.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            task_type: None,
            description: None,
            assignee_hint: None,
            stage_label: None,
            deadline_offset_days: None,
            position: None,
        }
    }

    /// A task node named after its id.
    pub fn task(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: Some(id.clone()),
            ..Self::new(id, NodeKind::Task)
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_deadline_days(mut self, days: u32) -> Self {
        self.deadline_offset_days = Some(days);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage_label = Some(stage.into());
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A directed edge of the diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Branch guard; only meaningful when leaving a `gateway_xor`.
    /// Empty or absent marks the default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl GraphEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// `true` for the else-branch of an exclusive gateway.
    pub fn is_default_branch(&self) -> bool {
        self.condition.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// ProcessGraph
// ---------------------------------------------------------------------------

/// The full diagram as stored on a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl ProcessGraph {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_gateways(&self) -> bool {
        self.nodes.iter().any(|n| n.kind.is_gateway())
    }

    /// Task nodes in declaration order.
    pub fn task_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Task)
    }
}
