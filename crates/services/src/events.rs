//! Events the engine emits after a transition has been persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something an assignee or a dashboard may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// A task instance became actionable.
    TaskReady {
        process_instance_id: Uuid,
        task_instance_id: Uuid,
        task_template_id: String,
        name: String,
        assignee_id: Option<String>,
    },
    TaskCompleted {
        process_instance_id: Uuid,
        task_instance_id: Uuid,
        task_template_id: String,
        assignee_id: Option<String>,
        at: DateTime<Utc>,
    },
    TaskSkipped {
        process_instance_id: Uuid,
        task_instance_id: Uuid,
        task_template_id: String,
        reason: Option<String>,
    },
    /// Every task instance reached a terminal state.
    InstanceCompleted {
        process_instance_id: Uuid,
        at: DateTime<Utc>,
    },
    InstanceStopped {
        process_instance_id: Uuid,
        actor_id: String,
        /// `suspended` or `aborted`.
        stop_type: String,
        reason: String,
    },
    InstanceResumed {
        process_instance_id: Uuid,
        actor_id: String,
    },
}

impl ProcessEvent {
    /// The process instance this event belongs to.
    pub fn process_instance_id(&self) -> Uuid {
        match self {
            Self::TaskReady { process_instance_id, .. }
            | Self::TaskCompleted { process_instance_id, .. }
            | Self::TaskSkipped { process_instance_id, .. }
            | Self::InstanceCompleted { process_instance_id, .. }
            | Self::InstanceStopped { process_instance_id, .. }
            | Self::InstanceResumed { process_instance_id, .. } => *process_instance_id,
        }
    }
}
