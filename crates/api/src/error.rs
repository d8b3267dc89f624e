//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, Value) {
        match self {
            Self::WorkflowNotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string(), "code": "workflow_not_found", "details": { "id": id } }),
            ),
            Self::Engine(err) => {
                let status = match err {
                    EngineError::NoSuchNode(_) => StatusCode::NOT_FOUND,
                    EngineError::NodeBusy(_) | EngineError::NotTestable { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                let mut body = json!({ "error": err.to_string(), "code": err.code() });
                if let EngineError::InvalidField(issues) = err {
                    body["details"] = json!({ "fields": issues });
                }
                (status, body)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}
