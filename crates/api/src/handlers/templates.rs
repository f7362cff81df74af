use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use engine::models::{ProcessGraph, ProcessTemplate, TaskTemplate, TemplateDraft};

use super::AppState;
use crate::ApiError;

/// Body of a successful `POST /templates/compile`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilePreview {
    pub tasks: Vec<TaskTemplate>,
    pub graph: ProcessGraph,
    pub linearized: bool,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ProcessTemplate>>, ApiError> {
    Ok(Json(state.engine.list_templates().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ProcessTemplate>, ApiError> {
    Ok(Json(state.engine.get_template(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(mut draft): Json<TemplateDraft>,
) -> Result<(StatusCode, Json<ProcessTemplate>), ApiError> {
    draft.id = None;
    let template = state.engine.save_template(draft).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(mut draft): Json<TemplateDraft>,
) -> Result<Json<ProcessTemplate>, ApiError> {
    draft.id = Some(id);
    Ok(Json(state.engine.save_template(draft).await?))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compile without saving; the editor calls this on every structural change.
pub async fn compile(
    State(state): State<AppState>,
    Json(graph): Json<ProcessGraph>,
) -> Result<Json<CompilePreview>, ApiError> {
    let compiled = state.engine.compile_preview(&graph)?;
    Ok(Json(CompilePreview {
        tasks: compiled.tasks,
        graph: compiled.graph,
        linearized: compiled.linearized,
    }))
}
