use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiError, AppState};
use engine::{Report, WorkflowDocument, WorkflowEditor};
use integrations::IntegrationSpec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowDto {
    pub flow_name: String,
}

/// A workflow document together with the ID it is served under.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub document: WorkflowDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub flow_name: String,
    pub nodes: usize,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn view(editor: &WorkflowEditor) -> WorkflowView {
    WorkflowView {
        id: editor.workflow_id(),
        updated_at: editor.updated_at(),
        document: editor.to_document(),
    }
}

pub async fn integrations(State(state): State<AppState>) -> Json<Vec<IntegrationSpec>> {
    Json(state.registry.integrations().into_iter().cloned().collect())
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    let editors: Vec<_> = state.workflows.read().await.values().cloned().collect();

    let mut summaries = Vec::with_capacity(editors.len());
    for editor in editors {
        let editor = editor.lock().await;
        summaries.push(WorkflowSummary {
            id: editor.workflow_id(),
            flow_name: editor.flow_name().to_owned(),
            nodes: editor.graph().len(),
            updated_at: editor.updated_at(),
        });
    }
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(summaries)
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> (StatusCode, Json<WorkflowView>) {
    let editor = WorkflowEditor::new(payload.flow_name, state.registry.clone(), state.config.clone());
    let body = view(&editor);
    state.insert(editor).await;
    (StatusCode::CREATED, Json(body))
}

/// Load a saved document; it must pass the structural checks.
pub async fn import(
    State(state): State<AppState>,
    Json(document): Json<WorkflowDocument>,
) -> Result<(StatusCode, Json<WorkflowView>), ApiError> {
    let editor = WorkflowEditor::from_document(&document, state.registry.clone(), state.config.clone())?;
    let body = view(&editor);
    state.insert(editor).await;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowView>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();
    Ok(Json(view(&editor)))
}

pub async fn rename(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<Json<WorkflowView>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();
    editor.rename(payload.flow_name);
    Ok(Json(view(&editor)))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    match state.workflows.write().await.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::WorkflowNotFound(id)),
    }
}

pub async fn validation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Report>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();
    Ok(Json(editor.validate()))
}
