//! Task state machine: drives the task instances of one process instance.
//!
//! ```text
//! NotStarted → ChainWait   instance started, predecessors unsatisfied
//! NotStarted → Ready       instance started, no predecessors
//! ChainWait  → Ready       every predecessor template satisfied
//! Ready      → InProgress  assignee starts
//! InProgress → Completed   assignee finishes
//! Ready      → Completed   TASK type only
//! open       → Skipped     administrative skip
//! ```
//!
//! A `ProcessRun` is the unit the engine locks, mutates and persists. Every
//! mutating method validates first and only then touches state, so a
//! rejected transition leaves the run exactly as it was.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use services::{ProcessEvent, User};

use crate::deadline::deadline_for;
use crate::error::{EngineError, InstanceAction, TaskAction};
use crate::models::{
    InstanceStatus, LifecycleAction, LifecycleEntry, PredecessorMode, ProcessInstance,
    ResumeRequest, StopRequest, StopType, TaskInstance, TaskStatus, TaskTemplate, TaskTemplateId,
};

/// What to create for one (template × assignee) pair at launch.
#[derive(Debug, Clone)]
pub struct TaskSeed {
    pub task_template_id: TaskTemplateId,
    /// `None` creates an unassigned instance.
    pub assignee: Option<User>,
    pub planned_start_at: Option<DateTime<Utc>>,
    pub planned_end_at: Option<DateTime<Utc>>,
    /// Explicit deadline; otherwise computed from the template offset.
    pub deadline_at: Option<DateTime<Utc>>,
}

impl TaskSeed {
    pub fn unassigned(task_template_id: TaskTemplateId) -> Self {
        Self {
            task_template_id,
            assignee: None,
            planned_start_at: None,
            planned_end_at: None,
            deadline_at: None,
        }
    }
}

/// Lookup tables built once from the frozen template snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
struct RunIndex {
    template_pos: HashMap<TaskTemplateId, usize>,
    /// Template id → positions in `tasks` (the fan-out).
    instances: HashMap<TaskTemplateId, Vec<usize>>,
    /// Template id → templates that list it as a predecessor.
    dependents: HashMap<TaskTemplateId, Vec<TaskTemplateId>>,
}

impl RunIndex {
    fn build(templates: &[TaskTemplate], tasks: &[TaskInstance]) -> Self {
        let mut index = Self::default();
        for (pos, template) in templates.iter().enumerate() {
            index.template_pos.insert(template.id.clone(), pos);
            for pred in &template.predecessor_ids {
                index
                    .dependents
                    .entry(pred.clone())
                    .or_default()
                    .push(template.id.clone());
            }
        }
        for (pos, task) in tasks.iter().enumerate() {
            index
                .instances
                .entry(task.task_template_id.clone())
                .or_default()
                .push(pos);
        }
        index
    }
}

/// A process instance together with its task instances and the template
/// snapshot it was started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RunDocument")]
pub struct ProcessRun {
    instance: ProcessInstance,
    tasks: Vec<TaskInstance>,
    templates: Vec<TaskTemplate>,
    #[serde(skip)]
    index: RunIndex,
}

/// Persisted shape of a run; the index is rebuilt on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunDocument {
    instance: ProcessInstance,
    tasks: Vec<TaskInstance>,
    templates: Vec<TaskTemplate>,
}

impl From<RunDocument> for ProcessRun {
    fn from(doc: RunDocument) -> Self {
        let index = RunIndex::build(&doc.templates, &doc.tasks);
        Self {
            instance: doc.instance,
            tasks: doc.tasks,
            templates: doc.templates,
            index,
        }
    }
}

impl ProcessRun {
    /// Create every task instance and put each one in `Ready` or `ChainWait`.
    ///
    /// Templates without a seed get a single unassigned instance. Returns the
    /// run and one `TaskReady` event per instance that is immediately ready.
    ///
    /// # Errors
    /// [`EngineError::Validation`] when a computed deadline falls outside the
    /// representable date range.
    pub fn launch(
        mut instance: ProcessInstance,
        templates: Vec<TaskTemplate>,
        seeds: Vec<TaskSeed>,
    ) -> Result<(Self, Vec<ProcessEvent>), EngineError> {
        let mut tasks = Vec::with_capacity(seeds.len().max(templates.len()));

        for template in &templates {
            let mut own: Vec<&TaskSeed> = seeds
                .iter()
                .filter(|s| s.task_template_id == template.id)
                .collect();
            let fallback = TaskSeed::unassigned(template.id.clone());
            if own.is_empty() {
                own.push(&fallback);
            }

            for seed in own {
                let anchor = seed.planned_start_at.unwrap_or(instance.start_at);
                let deadline_at = match seed.deadline_at {
                    Some(at) => Some(at),
                    None => deadline_for(anchor, template.deadline_offset_days)?,
                };
                tasks.push(TaskInstance {
                    id: Uuid::new_v4(),
                    process_instance_id: instance.id,
                    task_template_id: template.id.clone(),
                    name: template.name.clone(),
                    task_type: template.task_type,
                    stage_label: template.stage_label.clone(),
                    status: TaskStatus::NotStarted,
                    assignee_id: seed.assignee.as_ref().map(|u| u.id.clone()),
                    assignee_name: seed.assignee.as_ref().map(|u| u.name.clone()),
                    organization: seed.assignee.as_ref().and_then(|u| u.organization.clone()),
                    planned_start_at: seed.planned_start_at,
                    planned_end_at: seed.planned_end_at,
                    actual_start_at: None,
                    actual_end_at: None,
                    deadline_at,
                });
            }
        }

        instance.status = InstanceStatus::Active;
        let index = RunIndex::build(&templates, &tasks);
        let mut run = Self { instance, tasks, templates, index };

        let mut events = Vec::new();
        for pos in 0..run.tasks.len() {
            let blocked = run
                .template(&run.tasks[pos].task_template_id)
                .is_some_and(TaskTemplate::has_predecessors);
            let task = &mut run.tasks[pos];
            if blocked {
                task.status = TaskStatus::ChainWait;
            } else {
                task.status = TaskStatus::Ready;
                events.push(ready_event(task));
            }
        }

        Ok((run, events))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.instance.id
    }

    pub fn instance(&self) -> &ProcessInstance {
        &self.instance
    }

    pub fn tasks(&self) -> &[TaskInstance] {
        &self.tasks
    }

    pub fn templates(&self) -> &[TaskTemplate] {
        &self.templates
    }

    pub fn task(&self, task_id: Uuid) -> Option<&TaskInstance> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn template(&self, id: &TaskTemplateId) -> Option<&TaskTemplate> {
        self.index.template_pos.get(id).map(|&pos| &self.templates[pos])
    }

    /// All task instances fanned out from one template.
    pub fn instances_of<'a>(&'a self, id: &TaskTemplateId) -> impl Iterator<Item = &'a TaskInstance> + 'a {
        self.index
            .instances
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&pos| &self.tasks[pos])
    }

    /// Every task instance is completed or skipped.
    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    // -----------------------------------------------------------------------
    // Task transitions
    // -----------------------------------------------------------------------

    /// `Ready → InProgress`.
    ///
    /// # Errors
    /// `InvalidInstanceTransition` unless the instance is active,
    /// `TaskNotFound`, or `InvalidTaskTransition` unless the task is `Ready`.
    pub fn start_task(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<Vec<ProcessEvent>, EngineError> {
        self.ensure_active()?;
        let pos = self.position(task_id)?;
        let task = &mut self.tasks[pos];

        if task.status != TaskStatus::Ready {
            return Err(EngineError::InvalidTaskTransition {
                task_id,
                status: task.status,
                action: TaskAction::Start,
            });
        }

        task.status = TaskStatus::InProgress;
        task.actual_start_at = Some(now);
        debug!(%task_id, "task started");
        Ok(Vec::new())
    }

    /// `InProgress → Completed`, or `Ready → Completed` for plain tasks, then
    /// release whatever was waiting on this task's template.
    ///
    /// # Errors
    /// As [`ProcessRun::start_task`]; the task must be `InProgress`, or
    /// `Ready` with a type that allows direct completion.
    pub fn complete_task(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Result<Vec<ProcessEvent>, EngineError> {
        self.ensure_active()?;
        let pos = self.position(task_id)?;
        let task = &mut self.tasks[pos];

        let allowed = match task.status {
            TaskStatus::InProgress => true,
            TaskStatus::Ready => task.task_type.allows_direct_completion(),
            _ => false,
        };
        if !allowed {
            return Err(EngineError::InvalidTaskTransition {
                task_id,
                status: task.status,
                action: TaskAction::Complete,
            });
        }

        task.status = TaskStatus::Completed;
        task.actual_start_at.get_or_insert(now);
        task.actual_end_at = Some(now);

        let mut events = vec![ProcessEvent::TaskCompleted {
            process_instance_id: task.process_instance_id,
            task_instance_id: task.id,
            task_template_id: task.task_template_id.to_string(),
            assignee_id: task.assignee_id.clone(),
            at: now,
        }];
        let template_id = task.task_template_id.clone();

        events.extend(self.release_dependents(&template_id));
        events.extend(self.finish_if_done(now));
        Ok(events)
    }

    /// Any open task → `Skipped` (e.g. the branch not taken at an exclusive
    /// gateway), then release dependents.
    ///
    /// # Errors
    /// As [`ProcessRun::start_task`]; terminal tasks cannot be skipped.
    pub fn skip_task(
        &mut self,
        task_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProcessEvent>, EngineError> {
        self.ensure_active()?;
        let pos = self.position(task_id)?;
        let task = &mut self.tasks[pos];

        if task.status.is_terminal() {
            return Err(EngineError::InvalidTaskTransition {
                task_id,
                status: task.status,
                action: TaskAction::Skip,
            });
        }

        task.status = TaskStatus::Skipped;
        task.actual_end_at = Some(now);

        let mut events = vec![ProcessEvent::TaskSkipped {
            process_instance_id: task.process_instance_id,
            task_instance_id: task.id,
            task_template_id: task.task_template_id.to_string(),
            reason,
        }];
        let template_id = task.task_template_id.clone();

        events.extend(self.release_dependents(&template_id));
        events.extend(self.finish_if_done(now));
        Ok(events)
    }

    /// Re-evaluate readiness of every template. Idempotent; only ever moves
    /// tasks forward.
    pub fn recompute_all(&mut self) -> Vec<ProcessEvent> {
        let ids: Vec<TaskTemplateId> = self.templates.iter().map(|t| t.id.clone()).collect();
        ids.iter().flat_map(|id| self.release_template(id)).collect()
    }

    // -----------------------------------------------------------------------
    // Instance transitions
    // -----------------------------------------------------------------------

    /// Suspend (reversible) or abort (terminal) the instance.
    ///
    /// # Errors
    /// - `Validation` for a blank reason or actor.
    /// - `InvalidInstanceTransition` when suspending a non-active instance or
    ///   aborting a finished one.
    pub fn stop(&mut self, request: &StopRequest, now: DateTime<Utc>) -> Result<Vec<ProcessEvent>, EngineError> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(EngineError::Validation(
                "a reason is required to stop a process instance".into(),
            ));
        }
        if request.actor_id.trim().is_empty() {
            return Err(EngineError::Validation("actorId must not be empty".into()));
        }

        let (action, allowed, next, lifecycle) = match request.stop_type {
            StopType::Suspended => (
                InstanceAction::Suspend,
                self.instance.status == InstanceStatus::Active,
                InstanceStatus::Suspended,
                LifecycleAction::Suspended,
            ),
            StopType::Aborted => (
                InstanceAction::Abort,
                matches!(self.instance.status, InstanceStatus::Active | InstanceStatus::Suspended),
                InstanceStatus::Aborted,
                LifecycleAction::Aborted,
            ),
        };
        if !allowed {
            return Err(EngineError::InvalidInstanceTransition {
                instance_id: self.instance.id,
                status: self.instance.status,
                action,
            });
        }

        let instance = &mut self.instance;
        instance.status = next;
        instance.stop_type = Some(request.stop_type);
        instance.stop_reason = Some(reason.to_owned());
        instance.stopped_by_id = Some(request.actor_id.clone());
        instance.stopped_at = Some(now);
        if next == InstanceStatus::Aborted {
            instance.end_at = Some(now);
        }
        instance.history.push(LifecycleEntry {
            at: now,
            action: lifecycle,
            actor_id: Some(request.actor_id.clone()),
            reason: Some(reason.to_owned()),
        });

        Ok(vec![ProcessEvent::InstanceStopped {
            process_instance_id: instance.id,
            actor_id: request.actor_id.clone(),
            stop_type: request.stop_type.to_string(),
            reason: reason.to_owned(),
        }])
    }

    /// Lift a suspension. Task states are left exactly as they were.
    ///
    /// # Errors
    /// `InvalidInstanceTransition` unless the instance is suspended.
    pub fn resume(&mut self, request: &ResumeRequest, now: DateTime<Utc>) -> Result<Vec<ProcessEvent>, EngineError> {
        if self.instance.status != InstanceStatus::Suspended {
            return Err(EngineError::InvalidInstanceTransition {
                instance_id: self.instance.id,
                status: self.instance.status,
                action: InstanceAction::Resume,
            });
        }

        let instance = &mut self.instance;
        instance.status = InstanceStatus::Active;
        instance.stop_type = None;
        instance.stop_reason = None;
        instance.stopped_by_id = None;
        instance.stopped_at = None;
        instance.history.push(LifecycleEntry {
            at: now,
            action: LifecycleAction::Resumed,
            actor_id: Some(request.actor_id.clone()),
            reason: request.reason.clone().filter(|r| !r.trim().is_empty()),
        });

        Ok(vec![ProcessEvent::InstanceResumed {
            process_instance_id: instance.id,
            actor_id: request.actor_id.clone(),
        }])
    }

    // -----------------------------------------------------------------------
    // Internal: readiness
    // -----------------------------------------------------------------------

    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.instance.status == InstanceStatus::Active {
            Ok(())
        } else {
            Err(EngineError::InvalidInstanceTransition {
                instance_id: self.instance.id,
                status: self.instance.status,
                action: InstanceAction::Advance,
            })
        }
    }

    fn position(&self, task_id: Uuid) -> Result<usize, EngineError> {
        self.tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(EngineError::TaskNotFound {
                instance_id: self.instance.id,
                task_id,
            })
    }

    /// Recheck every template that depends on `template_id`.
    fn release_dependents(&mut self, template_id: &TaskTemplateId) -> Vec<ProcessEvent> {
        let dependents = self
            .index
            .dependents
            .get(template_id)
            .cloned()
            .unwrap_or_default();

        dependents.iter().flat_map(|dep| self.release_template(dep)).collect()
    }

    /// Move waiting instances of `id` to `Ready` if all predecessors are met.
    fn release_template(&mut self, id: &TaskTemplateId) -> Vec<ProcessEvent> {
        if !self.template_unblocked(id) {
            return Vec::new();
        }

        let mut events = Vec::new();
        let positions = self.index.instances.get(id).map(Vec::as_slice).unwrap_or_default();
        for &pos in positions {
            let task = &mut self.tasks[pos];
            if matches!(task.status, TaskStatus::NotStarted | TaskStatus::ChainWait) {
                task.status = TaskStatus::Ready;
                debug!(task_id = %task.id, template = %task.task_template_id, "task released");
                events.push(ready_event(task));
            }
        }
        events
    }

    /// Distinct predecessor templates always combine as ALL; the template's
    /// mode only decides how each one's fan-out counts.
    fn template_unblocked(&self, id: &TaskTemplateId) -> bool {
        let Some(template) = self.template(id) else {
            return false;
        };
        template
            .predecessor_ids
            .iter()
            .all(|pred| self.predecessor_satisfied(pred, template.predecessor_mode))
    }

    fn predecessor_satisfied(&self, pred: &TaskTemplateId, mode: PredecessorMode) -> bool {
        match mode {
            PredecessorMode::All => self.instances_of(pred).all(|t| t.status.is_terminal()),
            PredecessorMode::Any => {
                self.instances_of(pred).any(|t| t.status == TaskStatus::Completed)
                    || self.instances_of(pred).all(|t| t.status == TaskStatus::Skipped)
            }
        }
    }

    fn finish_if_done(&mut self, now: DateTime<Utc>) -> Option<ProcessEvent> {
        if self.instance.status != InstanceStatus::Active || !self.all_terminal() {
            return None;
        }

        self.instance.status = InstanceStatus::Completed;
        self.instance.end_at = Some(now);
        self.instance.history.push(LifecycleEntry {
            at: now,
            action: LifecycleAction::Completed,
            actor_id: None,
            reason: None,
        });
        Some(ProcessEvent::InstanceCompleted {
            process_instance_id: self.instance.id,
            at: now,
        })
    }
}

fn ready_event(task: &TaskInstance) -> ProcessEvent {
    ProcessEvent::TaskReady {
        process_instance_id: task.process_instance_id,
        task_instance_id: task.id,
        task_template_id: task.task_template_id.to_string(),
        name: task.name.clone(),
        assignee_id: task.assignee_id.clone(),
    }
}
