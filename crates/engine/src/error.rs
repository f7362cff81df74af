//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{InstanceStatus, TaskStatus, TaskTemplateId};

// ---------------------------------------------------------------------------
// Graph violations
// ---------------------------------------------------------------------------

/// A single structural problem found by graph validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphViolation {
    #[error("graph has no start node")]
    NoStartNode,

    #[error("graph has {count} start nodes, expected exactly one")]
    MultipleStartNodes { count: usize },

    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("duplicate edge ID: '{0}'")]
    DuplicateEdgeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge '{edge_id}' references unknown node '{node_id}' ({side} side)")]
    DanglingEdge {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },

    /// The node has no path from the start node.
    #[error("node '{0}' is not reachable from the start node")]
    Unreachable(String),

    /// Depth-first walk re-entered a node still on its stack.
    #[error("cycle detected at node '{0}'")]
    Cycle(String),

    #[error("exclusive gateway '{0}' has no outgoing edge")]
    XorWithoutOutgoing(String),

    #[error("task '{node_id}' has a deadline offset of {days} days, the limit is {max}")]
    DeadlineOffsetOutOfRange { node_id: String, days: u32, max: u32 },
}

/// Every violation found in one graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_violations(.violations))]
pub struct GraphValidationError {
    pub violations: Vec<GraphViolation>,
}

impl GraphValidationError {
    pub fn has_cycle(&self) -> bool {
        self.violations.iter().any(|v| matches!(v, GraphViolation::Cycle(_)))
    }
}

fn join_violations(violations: &[GraphViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Predecessor references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceProblem {
    SelfReference,
    UnknownTask,
    Duplicate,
}

impl std::fmt::Display for ReferenceProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfReference => write!(f, "a task cannot precede itself"),
            Self::UnknownTask => write!(f, "no such task in this template"),
            Self::Duplicate => write!(f, "listed more than once"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start,
    Complete,
    Skip,
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Suspend,
    Abort,
    Resume,
    /// Any task-level transition.
    Advance,
}

impl std::fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suspend => write!(f, "suspend"),
            Self::Abort => write!(f, "abort"),
            Self::Resume => write!(f, "resume"),
            Self::Advance => write!(f, "advance tasks of"),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors produced by the process engine (compilation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Template errors ------

    #[error("invalid process graph: {0}")]
    GraphValidation(#[from] GraphValidationError),

    /// A hand-edited predecessor list points somewhere it must not.
    #[error("task '{task_id}' lists predecessor '{predecessor_id}': {problem}")]
    PredecessorReference {
        task_id: TaskTemplateId,
        predecessor_id: TaskTemplateId,
        problem: ReferenceProblem,
    },

    /// Request-level validation failure (blank reason, unknown task id, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    // ------ Runtime transition errors ------

    #[error("cannot {action} task {task_id} while it is {status}")]
    InvalidTaskTransition {
        task_id: Uuid,
        status: TaskStatus,
        action: TaskAction,
    },

    #[error("cannot {action} process instance {instance_id} while it is {status}")]
    InvalidInstanceTransition {
        instance_id: Uuid,
        status: InstanceStatus,
        action: InstanceAction,
    },

    // ------ Lookup errors ------

    #[error("process template {0} not found")]
    TemplateNotFound(Uuid),

    #[error("process instance {0} not found")]
    InstanceNotFound(Uuid),

    #[error("task {task_id} not found in process instance {instance_id}")]
    TaskNotFound { instance_id: Uuid, task_id: Uuid },

    // ------ Persistence errors ------

    #[error("store error: {0}")]
    Store(String),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ------ Collaborator errors ------

    /// The user directory failed while an instance was being started.
    #[error("user directory error: {0}")]
    Directory(#[from] services::ServiceError),
}

impl EngineError {
    /// Caller mistakes that never touched stored state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::GraphValidation(_) | Self::PredecessorReference { .. } | Self::Validation(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InvalidTaskTransition { .. } | Self::InvalidInstanceTransition { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound(_) | Self::InstanceNotFound(_) | Self::TaskNotFound { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Non-fatal start warnings
// ---------------------------------------------------------------------------

/// Problems that do not block an instance from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StartWarning {
    /// The directory did not know the assignee; the task may run unassigned.
    #[error("assignee '{assignee_id}' for task '{task_template_id}' could not be resolved")]
    #[serde(rename_all = "camelCase")]
    MissingAssignee {
        task_template_id: TaskTemplateId,
        assignee_id: String,
    },
}
