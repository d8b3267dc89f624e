//! The `IntegrationClient` trait: the contract a node test call must fulfil.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::IntegrationError;

/// Everything a client needs to exercise one configured node.
///
/// Built by the engine when a test starts; owned by the test task so it never
/// borrows from the workflow graph.
#[derive(Debug, Clone)]
pub struct TestRequest {
    /// ID of the workflow document the node belongs to.
    pub workflow_id: uuid::Uuid,
    /// Graph-local ID of the node under test.
    pub node_id: u64,
    pub integration_id: String,
    pub operation_id: String,
    pub config: Map<String, Value>,
    /// Credential reference attached to the node, if any.
    pub credential_id: Option<String>,
    /// Sample outputs of earlier steps, keyed by node ID.
    pub input: Value,
}

/// Performs the (simulated or real) call behind a node test.
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    /// Run the operation once and return its JSON output.
    async fn test_operation(&self, request: &TestRequest) -> Result<Value, IntegrationError>;
}

/// A client that never leaves the process: it waits `latency` and echoes the
/// request back as the sample output.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClient {
    pub latency: Duration,
}

impl SimulatedClient {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl IntegrationClient for SimulatedClient {
    async fn test_operation(&self, request: &TestRequest) -> Result<Value, IntegrationError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        Ok(json!({
            "integration": request.integration_id,
            "operation": request.operation_id,
            "received": request.config,
        }))
    }
}
