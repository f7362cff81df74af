use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engine::models::{InstanceStatus, ProcessInstance, ResumeRequest, StartRequest, StopRequest};
use engine::{AssigneeProgress, EngineError, ProcessView, StartWarning};

use super::AppState;
use crate::ApiError;

#[derive(Deserialize)]
pub struct ListQuery {
    /// Lowercase instance status, e.g. `active`.
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SkipBody {
    pub reason: Option<String>,
}

/// Body of a successful `POST /processes`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(flatten)]
    pub view: ProcessView,
    pub warnings: Vec<StartWarning>,
}

pub async fn list(
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ProcessInstance>>, ApiError> {
    let status = query
        .status
        .map(|s| s.parse::<InstanceStatus>())
        .transpose()
        .map_err(EngineError::Validation)?;

    let runs = state.engine.list_instances(status).await?;
    Ok(Json(runs.iter().map(|r| r.instance().clone()).collect()))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ProcessView>, ApiError> {
    let run = state.engine.get_instance(id).await?;
    Ok(Json(state.engine.view(&run)))
}

pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let outcome = state.engine.start_instance(request).await?;
    let response = StartResponse {
        view: state.engine.view(&outcome.run),
        warnings: outcome.warnings,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn start_task(
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<ProcessView>, ApiError> {
    let run = state.engine.start_task(id, task_id).await?;
    Ok(Json(state.engine.view(&run)))
}

pub async fn complete_task(
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<ProcessView>, ApiError> {
    let run = state.engine.complete_task(id, task_id).await?;
    Ok(Json(state.engine.view(&run)))
}

/// The body is optional; `{"reason": "..."}` is recorded on the event.
pub async fn skip_task(
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    body: Option<Json<SkipBody>>,
) -> Result<Json<ProcessView>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let run = state.engine.skip_task(id, task_id, reason).await?;
    Ok(Json(state.engine.view(&run)))
}

pub async fn stop(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> Result<Json<ProcessView>, ApiError> {
    let run = state.engine.stop_instance(id, request).await?;
    Ok(Json(state.engine.view(&run)))
}

pub async fn resume(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<ProcessView>, ApiError> {
    let run = state.engine.resume_instance(id, request).await?;
    Ok(Json(state.engine.view(&run)))
}

pub async fn assignee_progress(
    State(state): State<AppState>,
) -> Result<Json<Vec<AssigneeProgress>>, ApiError> {
    Ok(Json(state.engine.assignee_summary().await?))
}
