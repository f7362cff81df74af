//! [`ProcessRepository`] backed by the `db` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use db::repository::{runs, templates};
use db::{DbError, DbPool, ProcessRunRow, ProcessTemplateRow};

use crate::error::EngineError;
use crate::models::{InstanceStatus, ProcessTemplate, Visibility};
use crate::state_machine::ProcessRun;
use crate::store::ProcessRepository;

/// Stores templates and runs as JSONB documents in Postgres.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: DbPool,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn template_row(template: &ProcessTemplate) -> Result<ProcessTemplateRow, EngineError> {
    let visibility = match template.visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    };
    Ok(ProcessTemplateRow {
        id: template.id,
        title: template.title.clone(),
        template_type: template.template_type.to_string().to_lowercase(),
        visibility: visibility.to_owned(),
        document: serde_json::to_value(template)?,
        created_at: template.created_at,
        updated_at: template.updated_at,
    })
}

fn run_row(run: &ProcessRun, saved_at: DateTime<Utc>) -> Result<ProcessRunRow, EngineError> {
    let instance = run.instance();
    Ok(ProcessRunRow {
        id: instance.id,
        template_id: instance.template_id,
        title: instance.title.clone(),
        status: instance.status.to_string(),
        started_by_id: instance.started_by_id.clone(),
        start_at: instance.start_at,
        document: serde_json::to_value(run)?,
        updated_at: saved_at,
    })
}

#[async_trait]
impl ProcessRepository for PgRepository {
    async fn save_template(&self, template: &ProcessTemplate) -> Result<(), EngineError> {
        let row = template_row(template)?;
        templates::upsert_template(&self.pool, &row).await?;
        debug!(template_id = %template.id, "template persisted");
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<ProcessTemplate>, EngineError> {
        templates::get_template(&self.pool, id)
            .await?
            .map(|row| serde_json::from_value(row.document).map_err(EngineError::from))
            .transpose()
    }

    async fn list_templates(&self) -> Result<Vec<ProcessTemplate>, EngineError> {
        templates::list_templates(&self.pool)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row.document).map_err(EngineError::from))
            .collect()
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool, EngineError> {
        match templates::delete_template(&self.pool, id).await {
            Ok(()) => Ok(true),
            Err(DbError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_run(&self, run: &ProcessRun, saved_at: DateTime<Utc>) -> Result<(), EngineError> {
        let row = run_row(run, saved_at)?;
        runs::upsert_run(&self.pool, &row).await?;
        debug!(instance_id = %run.id(), status = %row.status, "run persisted");
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<ProcessRun>, EngineError> {
        runs::get_run(&self.pool, id)
            .await?
            .map(|row| serde_json::from_value(row.document).map_err(EngineError::from))
            .transpose()
    }

    async fn list_runs(&self, status: Option<InstanceStatus>) -> Result<Vec<ProcessRun>, EngineError> {
        let status = status.map(|s| s.to_string());
        runs::list_runs(&self.pool, status.as_deref())
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row.document).map_err(EngineError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessGraph, ProcessInstance, TaskTemplate, TemplateType};
    use chrono::{Duration, TimeZone};

    #[test]
    fn template_rows_carry_lowercase_scalars() {
        let now = Utc::now();
        let template = ProcessTemplate {
            id: Uuid::new_v4(),
            title: "Launch".into(),
            description: String::new(),
            template_type: TemplateType::Project,
            tasks: vec![TaskTemplate::new("a", "A")],
            graph: ProcessGraph::default(),
            visibility: Visibility::Private,
            created_at: now,
            updated_at: now,
        };
        let row = template_row(&template).unwrap();
        assert_eq!(row.template_type, "project");
        assert_eq!(row.visibility, "private");

        let back: ProcessTemplate = serde_json::from_value(row.document).unwrap();
        assert_eq!(back, template);
    }

    #[test]
    fn run_rows_round_trip_through_the_document() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
        let instance = ProcessInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            title: "Trial 7".into(),
            status: InstanceStatus::Active,
            start_at: now,
            expected_end_at: None,
            end_at: None,
            started_by_id: "owner".into(),
            item_code: Some("IT-7".into()),
            mold_code: None,
            car_model_code: None,
            initiative_id: None,
            stop_type: None,
            stop_reason: None,
            stopped_by_id: None,
            stopped_at: None,
            history: Vec::new(),
        };
        let (run, _) = ProcessRun::launch(instance, vec![TaskTemplate::new("a", "A")], vec![]).unwrap();

        let saved_at = now + Duration::hours(2);
        let row = run_row(&run, saved_at).unwrap();
        assert_eq!(row.status, "active");
        assert_eq!(row.updated_at, saved_at);
        let back: ProcessRun = serde_json::from_value(row.document).unwrap();
        assert_eq!(back, run);
    }
}
