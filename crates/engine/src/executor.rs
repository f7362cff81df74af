//! Process engine.
//!
//! `ProcessEngine` is the central orchestrator:
//! 1. Compiles and stores templates.
//! 2. Starts instances: resolves assignees, fans tasks out, computes deadlines.
//! 3. Applies task and instance transitions under a per-instance lock.
//! 4. Persists every committed transition through the `ProcessRepository`.
//! 5. Publishes the resulting events after the lock is released. A failed
//!    publish is logged and never undoes the transition.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use services::{EventSink, ProcessEvent, UserDirectory};

use crate::clock::{Clock, SystemClock};
use crate::compiler::{compile_with, CompiledGraph};
use crate::dag::check_task_templates;
use crate::deadline::expected_end;
use crate::error::{EngineError, StartWarning};
use crate::models::{
    InstanceStatus, LifecycleAction, LifecycleEntry, ProcessGraph, ProcessInstance,
    ProcessTemplate, ResumeRequest, StartRequest, StopRequest, TaskInstance, TaskPlan,
    TaskTemplate, TaskTemplateId, TemplateDraft,
};
use crate::progress::{aggregate, summarize_assignees, AssigneeProgress, ProgressReport};
use crate::state_machine::{ProcessRun, TaskSeed};
use crate::store::ProcessRepository;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chain edge-less, gateway-less graphs in declaration order on compile.
    pub auto_linearize: bool,
    /// Maximum task instances one template may fan out to at start.
    pub max_fan_out: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_linearize: true,
            max_fan_out: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A freshly started run plus the non-fatal problems found on the way.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub run: ProcessRun,
    pub warnings: Vec<StartWarning>,
}

/// What callers see of a run: instance, tasks and a progress report as of now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessView {
    pub instance: ProcessInstance,
    pub tasks: Vec<TaskInstance>,
    pub progress: ProgressReport,
}

// ---------------------------------------------------------------------------
// ProcessEngine
// ---------------------------------------------------------------------------

/// Owns the collaborators and serializes mutations per process instance.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ProcessEngine {
    repo: Arc<dyn ProcessRepository>,
    directory: Arc<dyn UserDirectory>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ProcessEngine {
    pub fn new(
        repo: Arc<dyn ProcessRepository>,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            directory,
            events,
            clock: Arc::new(SystemClock),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall clock, e.g. with a `FixedClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Compile a graph without saving anything. Used by the editor preview.
    ///
    /// # Errors
    /// [`EngineError::GraphValidation`] listing every violation.
    pub fn compile_preview(&self, graph: &ProcessGraph) -> Result<CompiledGraph, EngineError> {
        compile_with(graph, &self.config)
    }

    /// Compile and store a template draft. A draft with an `id` replaces that
    /// template and keeps its creation time.
    ///
    /// # Errors
    /// - `Validation` for a blank title or a draft with neither graph nor tasks.
    /// - `GraphValidation` / `PredecessorReference` for structural problems.
    /// - `TemplateNotFound` when updating an id that does not exist.
    #[instrument(skip(self, draft), fields(template_id = ?draft.id, title = %draft.title))]
    pub async fn save_template(&self, draft: TemplateDraft) -> Result<ProcessTemplate, EngineError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("template title must not be empty".into()));
        }

        let (graph, tasks) = match (draft.graph, draft.tasks) {
            (Some(graph), edited) => {
                let compiled = compile_with(&graph, &self.config)?;
                if compiled.linearized {
                    info!("edge-less graph linearized into a sequential chain");
                }
                let tasks = match edited {
                    Some(edited) => apply_hand_edits(compiled.tasks, &edited)?,
                    None => compiled.tasks,
                };
                (compiled.graph, tasks)
            }
            (None, Some(tasks)) => (ProcessGraph::default(), tasks),
            (None, None) => {
                return Err(EngineError::Validation(
                    "a template needs a graph or a task list".into(),
                ))
            }
        };
        check_task_templates(&tasks)?;

        let now = self.clock.now();
        let (id, created_at) = match draft.id {
            Some(id) => {
                let existing = self.get_template(id).await?;
                (id, existing.created_at)
            }
            None => (Uuid::new_v4(), now),
        };

        let template = ProcessTemplate {
            id,
            title: title.to_owned(),
            description: draft.description,
            template_type: draft.template_type,
            tasks,
            graph,
            visibility: draft.visibility,
            created_at,
            updated_at: now,
        };
        self.repo.save_template(&template).await?;
        info!(template_id = %template.id, tasks = template.tasks.len(), "template saved");
        Ok(template)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<ProcessTemplate, EngineError> {
        self.repo
            .get_template(id)
            .await?
            .ok_or(EngineError::TemplateNotFound(id))
    }

    pub async fn list_templates(&self) -> Result<Vec<ProcessTemplate>, EngineError> {
        self.repo.list_templates().await
    }

    /// Delete a template. Started instances keep their own snapshot.
    #[instrument(skip(self))]
    pub async fn delete_template(&self, id: Uuid) -> Result<(), EngineError> {
        if !self.repo.delete_template(id).await? {
            return Err(EngineError::TemplateNotFound(id));
        }
        info!(template_id = %id, "template deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    /// Start a process instance from a stored template.
    ///
    /// Unknown assignees are not fatal: they come back as warnings, and a
    /// template left without any resolved assignee runs unassigned.
    ///
    /// # Errors
    /// - `TemplateNotFound`
    /// - `Validation` for a blank title or starter, a template with no tasks,
    ///   assignee/plan rows naming unknown task templates, duplicate plans, or
    ///   a fan-out above `max_fan_out`.
    /// - `Directory` when the user directory fails outright.
    #[instrument(skip(self, request), fields(template_id = %request.template_id))]
    pub async fn start_instance(&self, request: StartRequest) -> Result<StartOutcome, EngineError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("process title must not be empty".into()));
        }
        if request.started_by_id.trim().is_empty() {
            return Err(EngineError::Validation("startedById must not be empty".into()));
        }

        let template = self.get_template(request.template_id).await?;
        if template.tasks.is_empty() {
            return Err(EngineError::Validation(format!(
                "template {} has no tasks",
                template.id
            )));
        }

        let plans = self.check_start_request(&template, &request)?;

        // ------------------------------------------------------------------
        // Resolve assignees, one seed per resolved (template, user) pair.
        // ------------------------------------------------------------------
        let mut seeds = Vec::new();
        let mut warnings = Vec::new();

        for task in &template.tasks {
            let plan = plans.get(&task.id).copied();
            let mut seen = HashSet::new();
            let mut resolved = 0usize;

            for assignment in request
                .task_assignees
                .iter()
                .filter(|a| a.task_template_id == task.id)
            {
                if !seen.insert(assignment.assignee_id.as_str()) {
                    debug!(task = %task.id, assignee = %assignment.assignee_id, "duplicate assignee ignored");
                    continue;
                }

                match self.directory.resolve_user(&assignment.assignee_id).await? {
                    Some(user) => {
                        seeds.push(seed_for(task, Some(user), plan));
                        resolved += 1;
                    }
                    None => {
                        warn!(task = %task.id, assignee = %assignment.assignee_id, "assignee could not be resolved");
                        warnings.push(StartWarning::MissingAssignee {
                            task_template_id: task.id.clone(),
                            assignee_id: assignment.assignee_id.clone(),
                        });
                    }
                }
            }

            if resolved == 0 {
                seeds.push(seed_for(task, None, plan));
            }
        }

        // ------------------------------------------------------------------
        // Build the instance and launch it.
        // ------------------------------------------------------------------
        let now = self.clock.now();
        let instance = ProcessInstance {
            id: Uuid::new_v4(),
            template_id: template.id,
            title: title.to_owned(),
            status: InstanceStatus::Active,
            start_at: now,
            expected_end_at: expected_end(now, &template.tasks)?,
            end_at: None,
            started_by_id: request.started_by_id.clone(),
            item_code: request.item_code,
            mold_code: request.mold_code,
            car_model_code: request.car_model_code,
            initiative_id: request.initiative_id,
            stop_type: None,
            stop_reason: None,
            stopped_by_id: None,
            stopped_at: None,
            history: vec![LifecycleEntry {
                at: now,
                action: LifecycleAction::Started,
                actor_id: Some(request.started_by_id),
                reason: None,
            }],
        };

        let (run, events) = ProcessRun::launch(instance, template.tasks, seeds)?;
        self.repo.save_run(&run, now).await?;
        info!(
            instance_id = %run.id(),
            tasks = run.tasks().len(),
            warnings = warnings.len(),
            "process instance started"
        );

        self.publish(events).await;
        Ok(StartOutcome { run, warnings })
    }

    pub async fn get_instance(&self, id: Uuid) -> Result<ProcessRun, EngineError> {
        self.repo.get_run(id).await?.ok_or(EngineError::InstanceNotFound(id))
    }

    pub async fn list_instances(&self, status: Option<InstanceStatus>) -> Result<Vec<ProcessRun>, EngineError> {
        self.repo.list_runs(status).await
    }

    /// Instance, tasks and progress as of the engine clock.
    pub fn view(&self, run: &ProcessRun) -> ProcessView {
        ProcessView {
            instance: run.instance().clone(),
            tasks: run.tasks().to_vec(),
            progress: aggregate(run, self.clock.now()),
        }
    }

    /// Per-assignee totals across every active or suspended instance.
    pub async fn assignee_summary(&self) -> Result<Vec<AssigneeProgress>, EngineError> {
        let mut runs = self.repo.list_runs(Some(InstanceStatus::Active)).await?;
        runs.extend(self.repo.list_runs(Some(InstanceStatus::Suspended)).await?);
        Ok(summarize_assignees(&runs, self.clock.now()))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn start_task(&self, instance_id: Uuid, task_id: Uuid) -> Result<ProcessRun, EngineError> {
        self.mutate(instance_id, |run, now| run.start_task(task_id, now)).await
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self, instance_id: Uuid, task_id: Uuid) -> Result<ProcessRun, EngineError> {
        self.mutate(instance_id, |run, now| run.complete_task(task_id, now)).await
    }

    #[instrument(skip(self))]
    pub async fn skip_task(
        &self,
        instance_id: Uuid,
        task_id: Uuid,
        reason: Option<String>,
    ) -> Result<ProcessRun, EngineError> {
        self.mutate(instance_id, |run, now| run.skip_task(task_id, reason, now)).await
    }

    #[instrument(skip(self, request), fields(stop_type = %request.stop_type))]
    pub async fn stop_instance(&self, instance_id: Uuid, request: StopRequest) -> Result<ProcessRun, EngineError> {
        self.mutate(instance_id, |run, now| run.stop(&request, now)).await
    }

    #[instrument(skip(self, request))]
    pub async fn resume_instance(&self, instance_id: Uuid, request: ResumeRequest) -> Result<ProcessRun, EngineError> {
        self.mutate(instance_id, |run, now| run.resume(&request, now)).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Load, transition, persist under the instance lock; publish afterwards.
    ///
    /// `apply` works on a freshly loaded copy, so a rejected transition is
    /// simply dropped and the stored run stays as it was.
    async fn mutate<F>(&self, instance_id: Uuid, apply: F) -> Result<ProcessRun, EngineError>
    where
        F: FnOnce(&mut ProcessRun, DateTime<Utc>) -> Result<Vec<ProcessEvent>, EngineError>,
    {
        let lock = self.lock_for(instance_id);
        let (run, events) = {
            let _guard = lock.lock().await;

            let mut run = self.get_instance(instance_id).await?;
            let now = self.clock.now();
            let events = apply(&mut run, now)?;
            self.repo.save_run(&run, now).await?;
            (run, events)
        };

        let status = run.instance().status;
        if status.is_terminal() {
            self.forget_lock(instance_id);
            info!(%instance_id, %status, "process instance finished");
        }

        self.publish(events).await;
        Ok(run)
    }

    fn lock_for(&self, instance_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(instance_id).or_default().clone()
    }

    /// Terminal runs reject every transition, so their lock can go.
    fn forget_lock(&self, instance_id: Uuid) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&instance_id);
    }

    async fn publish(&self, events: Vec<ProcessEvent>) {
        for event in events {
            let instance_id = event.process_instance_id();
            if let Err(e) = self.events.publish(event).await {
                warn!(%instance_id, error = %e, "failed to publish process event");
            }
        }
    }

    /// Reject assignee/plan rows that name unknown templates and enforce the
    /// fan-out limit. Returns the plans keyed by template id.
    fn check_start_request<'a>(
        &self,
        template: &ProcessTemplate,
        request: &'a StartRequest,
    ) -> Result<HashMap<&'a TaskTemplateId, &'a TaskPlan>, EngineError> {
        let mut fan_out: HashMap<&TaskTemplateId, usize> = HashMap::new();
        for assignment in &request.task_assignees {
            if template.task(&assignment.task_template_id).is_none() {
                return Err(EngineError::Validation(format!(
                    "taskAssignees references unknown task template '{}'",
                    assignment.task_template_id
                )));
            }
            let count = fan_out.entry(&assignment.task_template_id).or_default();
            *count += 1;
            if *count > self.config.max_fan_out {
                return Err(EngineError::Validation(format!(
                    "task template '{}' has more than {} assignees",
                    assignment.task_template_id, self.config.max_fan_out
                )));
            }
        }

        let mut plans = HashMap::new();
        for plan in &request.task_plans {
            if template.task(&plan.task_template_id).is_none() {
                return Err(EngineError::Validation(format!(
                    "taskPlans references unknown task template '{}'",
                    plan.task_template_id
                )));
            }
            if plans.insert(&plan.task_template_id, plan).is_some() {
                return Err(EngineError::Validation(format!(
                    "taskPlans lists task template '{}' twice",
                    plan.task_template_id
                )));
            }
        }
        Ok(plans)
    }
}

fn seed_for(task: &TaskTemplate, assignee: Option<services::User>, plan: Option<&TaskPlan>) -> TaskSeed {
    TaskSeed {
        task_template_id: task.id.clone(),
        assignee,
        planned_start_at: plan.and_then(|p| p.planned_start_at),
        planned_end_at: plan.and_then(|p| p.planned_end_at),
        deadline_at: plan.and_then(|p| p.deadline_at),
    }
}

/// Hand-edited predecessor lists and modes win over compiled ones for tasks
/// with matching ids.
///
/// # Errors
/// [`EngineError::Validation`] when an edit names a task the graph does not
/// compile to.
fn apply_hand_edits(
    mut compiled: Vec<TaskTemplate>,
    edited: &[TaskTemplate],
) -> Result<Vec<TaskTemplate>, EngineError> {
    for edit in edited {
        let Some(task) = compiled.iter_mut().find(|t| t.id == edit.id) else {
            return Err(EngineError::Validation(format!(
                "edited task '{}' is not a task in the graph",
                edit.id
            )));
        };
        task.predecessor_ids = edit.predecessor_ids.clone();
        task.predecessor_mode = edit.predecessor_mode;
    }
    Ok(compiled)
}
