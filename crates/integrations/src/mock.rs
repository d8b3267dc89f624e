//! `MockClient`: a test double for `IntegrationClient`.
//!
//! Useful in unit and integration tests where a real integration is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{client::TestRequest, IntegrationClient, IntegrationError};

/// Behaviour injected into `MockClient` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Rejected` error.
    FailRejected(String),
    /// Fail with an `Unreachable` error.
    FailUnreachable(String),
    /// Never complete; only a timeout or cancellation ends the call.
    Hang,
}

/// A mock client that records every request it receives and returns a
/// programmer-specified result, optionally after a delay.
pub struct MockClient {
    /// What the client will do when `test_operation` is called.
    pub behaviour: MockBehaviour,
    /// Simulated latency before the behaviour is applied.
    pub delay: Duration,
    /// All requests seen by this client (in call order).
    pub calls: Arc<Mutex<Vec<TestRequest>>>,
}

impl MockClient {
    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self::with(MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Rejected` error.
    pub fn rejecting(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailRejected(msg.into()))
    }

    /// Create a mock that always fails with an `Unreachable` error.
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailUnreachable(msg.into()))
    }

    /// Create a mock whose calls never finish.
    pub fn hanging() -> Self {
        Self::with(MockBehaviour::Hang)
    }

    /// Delay every call by `delay`.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times this client has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl IntegrationClient for MockClient {
    async fn test_operation(&self, request: &TestRequest) -> Result<Value, IntegrationError> {
        self.calls.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(Value::Object(fields)) => {
                // Tag object outputs with the node so tests can see where they came from.
                let mut out = Map::new();
                out.insert("node".to_owned(), json!(request.node_id));
                out.extend(fields.clone());
                Ok(Value::Object(out))
            }
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRejected(msg) => Err(IntegrationError::Rejected(msg.clone())),
            MockBehaviour::FailUnreachable(msg) => Err(IntegrationError::Unreachable(msg.clone())),
            MockBehaviour::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TestRequest {
        TestRequest {
            workflow_id: uuid::Uuid::new_v4(),
            node_id: 7,
            integration_id: "http".into(),
            operation_id: "request".into(),
            config: Map::new(),
            credential_id: None,
            input: json!({}),
        }
    }

    #[tokio::test]
    async fn object_outputs_are_tagged_with_the_node() {
        let client = MockClient::returning(json!({ "status": 200 }));
        let out = client.test_operation(&request()).await.unwrap();
        assert_eq!(out, json!({ "node": 7, "status": 200 }));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn non_object_outputs_are_returned_unchanged() {
        for value in [json!([1, 2]), json!("plain"), json!(null)] {
            let client = MockClient::returning(value.clone());
            assert_eq!(client.test_operation(&request()).await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn failures_map_to_their_error_kind() {
        let rejected = MockClient::rejecting("bad token").test_operation(&request()).await;
        assert_eq!(rejected, Err(IntegrationError::Rejected("bad token".into())));

        let unreachable = MockClient::unreachable("dns").test_operation(&request()).await;
        assert_eq!(unreachable, Err(IntegrationError::Unreachable("dns".into())));
    }
}
