use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ApiError, AppState};
use engine::{ConnectionId, Node, NodeId, NodeKind, Position};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeDto {
    pub kind: NodeKind,
    pub integration_id: String,
    #[serde(default)]
    pub position: Option<Position>,
    /// Explicit source; omitted means "chain from the most recent node".
    #[serde(default)]
    pub after: Option<NodeId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddConditionDto {
    pub after: NodeId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigDto {
    pub operation_id: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCredentialDto {
    #[serde(default)]
    pub credential_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectDto {
    pub source_id: NodeId,
    pub target_id: NodeId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Created<T> {
    pub id: T,
}

pub async fn add_node(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<AddNodeDto>,
) -> Result<(StatusCode, Json<Created<NodeId>>), ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let node_id = match payload.after {
        Some(source) => {
            editor.add_node_after(source, payload.kind, &payload.integration_id, payload.position)?
        }
        None => editor.add_node(payload.kind, &payload.integration_id, payload.position)?,
    };
    Ok((StatusCode::CREATED, Json(Created { id: node_id })))
}

pub async fn add_condition(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<AddConditionDto>,
) -> Result<(StatusCode, Json<Created<NodeId>>), ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let node_id = editor.add_condition(payload.after)?;
    Ok((StatusCode::CREATED, Json(Created { id: node_id })))
}

pub async fn connect(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ConnectDto>,
) -> Result<(StatusCode, Json<Created<ConnectionId>>), ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let conn = editor.connect(payload.source_id, payload.target_id)?;
    Ok((StatusCode::CREATED, Json(Created { id: conn })))
}

pub async fn update_config(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateConfigDto>,
) -> Result<Json<Node>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let updated = editor.update_node_config(NodeId(node), &payload.operation_id, payload.config)?;
    Ok(Json(updated))
}

pub async fn set_credential(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
    Json(payload): Json<SetCredentialDto>,
) -> Result<Json<Node>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let updated = editor.set_credential(NodeId(node), payload.credential_id)?;
    Ok(Json(updated))
}

pub async fn delete_node(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    editor.delete_node(NodeId(node))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ancestors(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let ancestors = editor
        .ancestors_of(NodeId(node))?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ancestors))
}
