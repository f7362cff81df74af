//! Core domain models for the process engine.
//!
//! These types are the source of truth for templates and running instances
//! in memory. They serialise to the camelCase JSON the editor and dashboards
//! consume, and to the JSONB documents the `db` crate stores.

pub mod graph;
pub mod instance;
pub mod template;

pub use graph::{GraphEdge, GraphNode, NodeKind, Position, ProcessGraph, TaskType};
pub use instance::{
    InstanceStatus, LifecycleAction, LifecycleEntry, ProcessInstance, ResumeRequest,
    StartRequest, StopRequest, StopType, TaskAssignment, TaskInstance, TaskPlan, TaskStatus,
};
pub use template::{
    PredecessorMode, ProcessTemplate, TaskTemplate, TaskTemplateId, TemplateDraft, TemplateType,
    Visibility,
};
