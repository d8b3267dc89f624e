//! Authoring-time node tests.
//!
//! A test is the one asynchronous operation in the model. The editor marks
//! the node `Running`, captures a generation number, and spawns a task that
//! calls the integration client under a timeout. The task never touches the
//! graph: it sends a [`TestOutcome`] back over a channel, and the editor
//! applies it only if the generation still matches. A cancelled,
//! re-started or deleted node therefore never has a stale result written
//! over it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use integrations::{IntegrationClient, IntegrationError, TestRequest};

use crate::models::NodeId;
use crate::status::FailureReason;

/// Result of one finished test task, tagged with the generation it started under.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub node_id: NodeId,
    pub generation: u64,
    pub result: Result<Value, FailureReason>,
    pub finished_at: DateTime<Utc>,
}

/// Caller-side handle to a running test.
///
/// Dropping the handle does not stop the test.
#[derive(Debug)]
pub struct TestHandle {
    node_id: NodeId,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TestHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the test to stop. The node is marked `Failed` with reason
    /// `Cancelled` once the outcome is applied by the editor.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the task has delivered its outcome to the editor's channel.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!("test task for {} ended abnormally: {}", self.node_id, e);
        }
    }
}

/// Bookkeeping the editor keeps per in-flight test.
#[derive(Debug)]
pub(crate) struct InFlightTest {
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Spawn the task behind one node test.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_test(
    client: Arc<dyn IntegrationClient>,
    request: TestRequest,
    node_id: NodeId,
    generation: u64,
    timeout: Duration,
    outcomes: mpsc::UnboundedSender<TestOutcome>,
) -> (TestHandle, InFlightTest) {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let result = run_test(client.as_ref(), &request, node_id, timeout, &task_cancel).await;
        let outcome = TestOutcome {
            node_id,
            generation,
            result,
            finished_at: Utc::now(),
        };
        // The editor may already be gone; the outcome is then moot.
        let _ = outcomes.send(outcome);
    });

    let handle = TestHandle {
        node_id,
        generation,
        cancel: cancel.clone(),
        task,
    };
    (handle, InFlightTest { generation, cancel })
}

#[instrument(skip(client, request, cancel), fields(node_id = %node_id, operation = %request.operation_id))]
async fn run_test(
    client: &dyn IntegrationClient,
    request: &TestRequest,
    node_id: NodeId,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Value, FailureReason> {
    tokio::select! {
        _ = cancel.cancelled() => {
            info!("test cancelled");
            Err(FailureReason::Cancelled)
        }
        res = tokio::time::timeout(timeout, client.test_operation(request)) => match res {
            Ok(Ok(output)) => {
                info!("test succeeded");
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!("test failed: {}", e);
                Err(failure_from(e))
            }
            Err(_) => {
                warn!("test timed out after {:?}", timeout);
                Err(FailureReason::Timeout)
            }
        },
    }
}

fn failure_from(err: IntegrationError) -> FailureReason {
    FailureReason::Integration {
        message: err.to_string(),
    }
}
