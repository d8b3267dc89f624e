//! `api` crate: HTTP surface over in-memory workflow documents.
//!
//! Exposes:
//!   GET    /api/v1/integrations
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   POST   /api/v1/workflows/import
//!   GET    /api/v1/workflows/{id}
//!   PATCH  /api/v1/workflows/{id}
//!   DELETE /api/v1/workflows/{id}
//!   GET    /api/v1/workflows/{id}/validation
//!   POST   /api/v1/workflows/{id}/nodes
//!   POST   /api/v1/workflows/{id}/conditions
//!   POST   /api/v1/workflows/{id}/connections
//!   DELETE /api/v1/workflows/{id}/nodes/{node}
//!   PUT    /api/v1/workflows/{id}/nodes/{node}/config
//!   PUT    /api/v1/workflows/{id}/nodes/{node}/credential
//!   GET    /api/v1/workflows/{id}/nodes/{node}/ancestors
//!   POST   /api/v1/workflows/{id}/nodes/{node}/test
//!   DELETE /api/v1/workflows/{id}/nodes/{node}/test
//!
//! Each document sits behind its own mutex, so mutations of one workflow are
//! serialised while different workflows proceed independently.

pub mod error;
pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use engine::{EditorConfig, WorkflowEditor};
use integrations::{CapabilityRegistry, IntegrationClient};

pub use error::ApiError;


/// One workflow document with its single writer lock.
pub type SharedEditor = Arc<Mutex<WorkflowEditor>>;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn CapabilityRegistry>,
    /// Client used for node tests started over HTTP.
    pub client: Arc<dyn IntegrationClient>,
    pub config: EditorConfig,
    pub workflows: Arc<RwLock<HashMap<Uuid, SharedEditor>>>,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        client: Arc<dyn IntegrationClient>,
        config: EditorConfig,
    ) -> Self {
        Self {
            registry,
            client,
            config,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a document, or `ApiError::WorkflowNotFound`.
    pub async fn editor(&self, id: Uuid) -> Result<SharedEditor, ApiError> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ApiError::WorkflowNotFound(id))
    }

    pub async fn insert(&self, editor: WorkflowEditor) -> Uuid {
        let id = editor.workflow_id();
        self.workflows
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(editor)));
        id
    }
}

/// Build the router with every route mounted.
pub fn router(state: AppState) -> Router {
    use handlers::{executions, nodes, workflows};

    Router::new()
        .route("/api/v1/integrations", get(workflows::integrations))
        .route("/api/v1/workflows", get(workflows::list).post(workflows::create))
        .route("/api/v1/workflows/import", post(workflows::import))
        .route(
            "/api/v1/workflows/:id",
            get(workflows::get)
                .patch(workflows::rename)
                .delete(workflows::delete),
        )
        .route("/api/v1/workflows/:id/validation", get(workflows::validation))
        .route("/api/v1/workflows/:id/nodes", post(nodes::add_node))
        .route("/api/v1/workflows/:id/conditions", post(nodes::add_condition))
        .route("/api/v1/workflows/:id/connections", post(nodes::connect))
        .route("/api/v1/workflows/:id/nodes/:node", axum::routing::delete(nodes::delete_node))
        .route("/api/v1/workflows/:id/nodes/:node/config", put(nodes::update_config))
        .route("/api/v1/workflows/:id/nodes/:node/credential", put(nodes::set_credential))
        .route("/api/v1/workflows/:id/nodes/:node/ancestors", get(nodes::ancestors))
        .route(
            "/api/v1/workflows/:id/nodes/:node/test",
            post(executions::run_test).delete(executions::cancel_test),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
