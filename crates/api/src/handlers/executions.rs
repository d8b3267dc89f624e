use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiError, AppState};
use engine::NodeId;

/// Returned when a node test is accepted; the outcome shows up on the node.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStarted {
    pub node_id: NodeId,
    pub generation: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCancelled {
    pub node_id: NodeId,
    pub cancelled: bool,
}

pub async fn run_test(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TestStarted>), ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    // The handle is dropped; the outcome is applied on a later request.
    let handle = editor.run_test(NodeId(node), state.client.clone())?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TestStarted {
            node_id: handle.node_id(),
            generation: handle.generation(),
        }),
    ))
}

pub async fn cancel_test(
    Path((id, node)): Path<(Uuid, u64)>,
    State(state): State<AppState>,
) -> Result<Json<TestCancelled>, ApiError> {
    let editor = state.editor(id).await?;
    let mut editor = editor.lock().await;
    editor.apply_pending_outcomes();

    let cancelled = editor.cancel_test(NodeId(node))?;
    Ok(Json(TestCancelled {
        node_id: NodeId(node),
        cancelled,
    }))
}
