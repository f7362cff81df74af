//! Persistence seam for templates and runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{InstanceStatus, ProcessTemplate};
use crate::state_machine::ProcessRun;

/// Storage for templates and process runs.
///
/// Implementations only store and fetch; they never validate or transition.
/// Writers to one run are serialized by the engine, so `save_run` may simply
/// overwrite.
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    async fn save_template(&self, template: &ProcessTemplate) -> Result<(), EngineError>;

    async fn get_template(&self, id: Uuid) -> Result<Option<ProcessTemplate>, EngineError>;

    /// Most recently updated first.
    async fn list_templates(&self) -> Result<Vec<ProcessTemplate>, EngineError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_template(&self, id: Uuid) -> Result<bool, EngineError>;

    /// `saved_at` is the engine clock's time of the write.
    async fn save_run(&self, run: &ProcessRun, saved_at: DateTime<Utc>) -> Result<(), EngineError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<ProcessRun>, EngineError>;

    /// Newest first, optionally filtered by instance status.
    async fn list_runs(&self, status: Option<InstanceStatus>) -> Result<Vec<ProcessRun>, EngineError>;
}

/// Process-local store for development, tests and the `serve` command when
/// no database is configured.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    templates: RwLock<HashMap<Uuid, ProcessTemplate>>,
    runs: RwLock<HashMap<Uuid, ProcessRun>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRepository for MemoryRepository {
    async fn save_template(&self, template: &ProcessTemplate) -> Result<(), EngineError> {
        self.templates.write().await.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<ProcessTemplate>, EngineError> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<ProcessTemplate>, EngineError> {
        let mut templates: Vec<_> = self.templates.read().await.values().cloned().collect();
        templates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(templates)
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool, EngineError> {
        Ok(self.templates.write().await.remove(&id).is_some())
    }

    async fn save_run(&self, run: &ProcessRun, _saved_at: DateTime<Utc>) -> Result<(), EngineError> {
        self.runs.write().await.insert(run.id(), run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<ProcessRun>, EngineError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_runs(&self, status: Option<InstanceStatus>) -> Result<Vec<ProcessRun>, EngineError> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|run| status.map_or(true, |s| run.instance().status == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            b.instance()
                .start_at
                .cmp(&a.instance().start_at)
                .then(a.id().cmp(&b.id()))
        });
        Ok(runs)
    }
}
