//! Graph mutation service.
//!
//! `WorkflowEditor` is the only writer of a [`WorkflowGraph`]:
//! 1. Every mutation checks all of its preconditions first and only then
//!    touches the graph, so a failed call leaves the graph unchanged.
//! 2. The capability registry decides which integrations may start a
//!    workflow and which fields an operation accepts.
//! 3. Node status follows the state machine in [`crate::status`].
//! 4. Node tests run as independent tasks; their outcomes come back through
//!    a channel and are applied by the editor (see [`crate::testing`]).
//!
//! One editor per workflow document, mutated from one logical thread.
//! Hosts with several writers wrap it in a single lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use integrations::{
    CapabilityRegistry, IntegrationClient, OperationSchema, Role, TestRequest,
    CONDITION_INTEGRATION, MANUAL_OPERATION,
};

use crate::ancestry;
use crate::dag;
use crate::graph::WorkflowGraph;
use crate::models::{ConnectionId, Node, NodeId, NodeKind, Position, WorkflowDocument};
use crate::status::{FailureReason, NodeStatus, StatusEvent};
use crate::testing::{self, InFlightTest, TestHandle, TestOutcome};
use crate::validation::{self, Report};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the editor.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// A node test with no completion after this long fails with `Timeout`.
    pub test_timeout: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEditor
// ---------------------------------------------------------------------------

/// Owns one workflow graph and every rule about how it may change.
pub struct WorkflowEditor {
    workflow_id: Uuid,
    flow_name: String,
    graph: WorkflowGraph,
    registry: Arc<dyn CapabilityRegistry>,
    config: EditorConfig,
    in_flight: HashMap<NodeId, InFlightTest>,
    next_generation: u64,
    outcome_tx: mpsc::UnboundedSender<TestOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<TestOutcome>,
    updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for WorkflowEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEditor")
            .field("workflow_id", &self.workflow_id)
            .field("flow_name", &self.flow_name)
            .field("nodes", &self.graph.len())
            .field("tests_in_flight", &self.in_flight.len())
            .finish()
    }
}

impl Drop for WorkflowEditor {
    fn drop(&mut self) {
        for (node_id, test) in self.in_flight.drain() {
            debug!("cancelling test of {} on editor drop", node_id);
            test.cancel.cancel();
        }
    }
}

impl WorkflowEditor {
    /// Start an empty workflow.
    pub fn new(
        flow_name: impl Into<String>,
        registry: Arc<dyn CapabilityRegistry>,
        config: EditorConfig,
    ) -> Self {
        Self::with_graph(flow_name.into(), WorkflowGraph::new(), registry, config)
    }

    /// Resume editing a saved document.
    ///
    /// Every node is checked against the registry and its status is
    /// recomputed from its config; persisted statuses are not trusted.
    ///
    /// # Errors
    /// Any structural problem found by [`dag::check_structure`], plus
    /// `NotATrigger`, `UnknownIntegration`, `RoleNotSupported`,
    /// `UnknownOperation` and `InvalidField` for nodes the registry rejects.
    pub fn from_document(
        doc: &WorkflowDocument,
        registry: Arc<dyn CapabilityRegistry>,
        config: EditorConfig,
    ) -> Result<Self, EngineError> {
        let graph = WorkflowGraph::from_document(doc)?;
        let mut editor = Self::with_graph(doc.flow_name.clone(), graph, registry, config);
        editor.reconcile_loaded_nodes()?;
        Ok(editor)
    }

    fn reconcile_loaded_nodes(&mut self) -> Result<(), EngineError> {
        let ids: Vec<NodeId> = self.graph.all_nodes().iter().map(|n| n.id).collect();
        for node_id in ids {
            let node = self.node(node_id)?;
            self.check_role(node.kind, &node.integration_id)?;
            if let Some(operation_id) = node.operation_id.as_deref() {
                self.operation_for(node, operation_id)?
                    .check(&node.config)
                    .map_err(EngineError::InvalidField)?;
            }

            let loaded = node.status;
            let status = match (self.is_complete(node, node.credential_id.as_deref()), loaded) {
                (false, _) => NodeStatus::Incomplete,
                (true, NodeStatus::Incomplete) => NodeStatus::Configured,
                // Test history survives a load when the config still holds.
                (true, status) => status,
            };
            if status != loaded {
                let node = self
                    .graph
                    .node_mut(node_id)
                    .ok_or(EngineError::NoSuchNode(node_id))?;
                reset_test_results(node, status);
                warn!("loaded {} as {} (saved as {})", node_id, status, loaded);
            }
        }
        Ok(())
    }

    fn with_graph(
        flow_name: String,
        graph: WorkflowGraph,
        registry: Arc<dyn CapabilityRegistry>,
        config: EditorConfig,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            workflow_id: Uuid::new_v4(),
            flow_name,
            graph,
            registry,
            config,
            in_flight: HashMap::new(),
            next_generation: 1,
            outcome_tx,
            outcome_rx,
            updated_at: Utc::now(),
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn rename(&mut self, flow_name: impl Into<String>) {
        self.flow_name = flow_name.into();
        self.touch();
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn to_document(&self) -> WorkflowDocument {
        self.graph.to_document(self.flow_name.clone())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn node(&self, node_id: NodeId) -> Result<&Node, EngineError> {
        self.graph
            .get_node(node_id)
            .ok_or(EngineError::NoSuchNode(node_id))
    }

    // -----------------------------------------------------------------------
    // Adding nodes
    // -----------------------------------------------------------------------

    /// Append a node, auto-connected from the most recently added node.
    ///
    /// A trigger is never auto-connected. While the workflow has no trigger,
    /// only a trigger on a trigger-capable integration may be added.
    ///
    /// # Errors
    /// `NotATrigger`, `TriggerAlreadyConfigured`, `UnknownIntegration`,
    /// `RoleNotSupported`.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        integration_id: &str,
        position: Option<Position>,
    ) -> Result<NodeId, EngineError> {
        let source = match kind {
            NodeKind::Trigger => None,
            _ => self.graph.last_node().map(|n| n.id),
        };
        self.insert(kind, integration_id, position, source)
    }

    /// Append a node connected from an explicit `source_id`.
    ///
    /// # Errors
    /// `NoSuchNode` plus everything [`add_node`](Self::add_node) can return;
    /// `TriggerHasInputs` if `kind` is `Trigger`.
    pub fn add_node_after(
        &mut self,
        source_id: NodeId,
        kind: NodeKind,
        integration_id: &str,
        position: Option<Position>,
    ) -> Result<NodeId, EngineError> {
        self.node(source_id)?;
        self.insert(kind, integration_id, position, Some(source_id))
    }

    /// Insert a condition node connected from `after_node_id`. Its branches
    /// are attached later with [`add_node_after`](Self::add_node_after) or
    /// [`connect`](Self::connect).
    pub fn add_condition(&mut self, after_node_id: NodeId) -> Result<NodeId, EngineError> {
        self.add_node_after(after_node_id, NodeKind::Condition, CONDITION_INTEGRATION, None)
    }

    fn insert(
        &mut self,
        kind: NodeKind,
        integration_id: &str,
        position: Option<Position>,
        source: Option<NodeId>,
    ) -> Result<NodeId, EngineError> {
        if let Err(e) = self.check_insert(kind, integration_id, source) {
            warn!("rejected {} node on '{}': {}", kind, integration_id, e);
            return Err(e);
        }

        let node_id = self.graph.peek_node_id();
        let node = Node::new(node_id, kind, integration_id, position);
        let connection = self.graph.insert_node(node, source)?;
        self.touch();

        match (source, connection) {
            (Some(source), Some(conn)) => info!(
                "added {} node {} on '{}' ({} from {})",
                kind, node_id, integration_id, conn, source
            ),
            _ => info!("added {} node {} on '{}'", kind, node_id, integration_id),
        }
        Ok(node_id)
    }

    fn check_insert(
        &self,
        kind: NodeKind,
        integration_id: &str,
        source: Option<NodeId>,
    ) -> Result<(), EngineError> {
        match (self.graph.trigger(), kind) {
            (Some(_), NodeKind::Trigger) => return Err(EngineError::TriggerAlreadyConfigured),
            (Some(_), _) => {}
            (None, NodeKind::Trigger) if self.registry.supports_trigger(integration_id) => {}
            (None, _) => {
                return Err(EngineError::NotATrigger {
                    integration_id: integration_id.to_owned(),
                })
            }
        }

        if kind == NodeKind::Trigger {
            if source.is_some() {
                return Err(EngineError::TriggerHasInputs(self.graph.peek_node_id()));
            }
            return Ok(());
        }

        self.check_role(kind, integration_id)?;

        match source {
            Some(source) if self.graph.contains(source) => Ok(()),
            Some(source) => Err(EngineError::NoSuchNode(source)),
            // A trigger exists, so there is always a last node to chain from.
            None => Err(EngineError::NotATrigger {
                integration_id: integration_id.to_owned(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Select an operation and set its parameters, then recompute status.
    ///
    /// Missing required fields are accepted (the node stays `Incomplete`);
    /// unknown or wrongly typed fields are rejected. Any previously computed
    /// validation report is stale afterwards.
    ///
    /// # Errors
    /// `NoSuchNode`, `NodeBusy`, `UnknownOperation`, `InvalidField`.
    pub fn update_node_config(
        &mut self,
        node_id: NodeId,
        operation_id: &str,
        config: Map<String, Value>,
    ) -> Result<Node, EngineError> {
        let node = self.node(node_id)?;
        if node.status.is_running() {
            return Err(EngineError::NodeBusy(node_id));
        }

        let operation = self.operation_for(node, operation_id)?;
        let check = operation.check(&config).map_err(|issues| {
            warn!("rejected config for {}: {} invalid field(s)", node_id, issues.len());
            EngineError::InvalidField(issues)
        })?;
        let complete = check.is_complete()
            && self.is_authenticated(node, operation_id, node.credential_id.as_deref());
        let status = self.next_status(node, StatusEvent::Reconfigured { complete })?;

        let node = self
            .graph
            .node_mut(node_id)
            .ok_or(EngineError::NoSuchNode(node_id))?;
        node.operation_id = Some(operation_id.to_owned());
        node.config = config;
        reset_test_results(node, status);
        let updated = node.clone();
        self.touch();

        info!(
            "configured {} with '{}' → {} (missing: {:?})",
            node_id, operation_id, status, check.missing
        );
        Ok(updated)
    }

    /// Attach (or clear) the credential a node authenticates with.
    ///
    /// # Errors
    /// `NoSuchNode`, `NodeBusy`.
    pub fn set_credential(
        &mut self,
        node_id: NodeId,
        credential_id: Option<String>,
    ) -> Result<Node, EngineError> {
        let node = self.node(node_id)?;
        if node.status.is_running() {
            return Err(EngineError::NodeBusy(node_id));
        }

        let complete = self.is_complete(node, credential_id.as_deref());
        let status = self.next_status(node, StatusEvent::Reconfigured { complete })?;

        let node = self
            .graph
            .node_mut(node_id)
            .ok_or(EngineError::NoSuchNode(node_id))?;
        node.credential_id = credential_id;
        reset_test_results(node, status);
        let updated = node.clone();
        self.touch();

        info!("credential updated on {} → {}", node_id, status);
        Ok(updated)
    }

    /// The integration must exist and offer an operation for the node's role.
    fn check_role(&self, kind: NodeKind, integration_id: &str) -> Result<(), EngineError> {
        let spec = self
            .registry
            .integration(integration_id)
            .ok_or_else(|| EngineError::UnknownIntegration(integration_id.to_owned()))?;
        let role = role_of(kind);
        if spec.supports(role) {
            return Ok(());
        }
        Err(match kind {
            NodeKind::Trigger => EngineError::NotATrigger {
                integration_id: integration_id.to_owned(),
            },
            _ => EngineError::RoleNotSupported {
                integration_id: integration_id.to_owned(),
                role,
            },
        })
    }

    fn operation_for(&self, node: &Node, operation_id: &str) -> Result<&OperationSchema, EngineError> {
        let role = role_of(node.kind);
        self.registry
            .operation(&node.integration_id, operation_id)
            .filter(|op| op.role == role)
            .ok_or_else(|| EngineError::UnknownOperation {
                integration_id: node.integration_id.clone(),
                operation_id: operation_id.to_owned(),
                role,
            })
    }

    /// Whether the node's current operation and config are runnable with
    /// `credential_id`.
    fn is_complete(&self, node: &Node, credential_id: Option<&str>) -> bool {
        let Some(operation_id) = node.operation_id.as_deref() else {
            return false;
        };
        let Ok(operation) = self.operation_for(node, operation_id) else {
            return false;
        };
        let config_complete = operation
            .check(&node.config)
            .map(|check| check.is_complete())
            .unwrap_or(false);
        config_complete && self.is_authenticated(node, operation_id, credential_id)
    }

    fn is_authenticated(&self, node: &Node, operation_id: &str, credential_id: Option<&str>) -> bool {
        if node.kind == NodeKind::Trigger && operation_id == MANUAL_OPERATION {
            return true;
        }
        let auth_required = self
            .registry
            .integration(&node.integration_id)
            .map_or(false, |spec| spec.auth_required);
        !auth_required || credential_id.map_or(false, |c| !c.trim().is_empty())
    }

    fn next_status(&self, node: &Node, event: StatusEvent) -> Result<NodeStatus, EngineError> {
        node.status.next(event).ok_or(match event {
            StatusEvent::Reconfigured { .. } => EngineError::NodeBusy(node.id),
            _ => EngineError::NotTestable {
                node_id: node.id,
                status: node.status,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Deletion and wiring
    // -----------------------------------------------------------------------

    /// Remove a node and every connection touching it. A running test on the
    /// node is cancelled and its outcome discarded.
    ///
    /// Deleting the trigger puts the workflow back under the trigger rule:
    /// the next node added must again be a trigger.
    pub fn delete_node(&mut self, node_id: NodeId) -> Result<(), EngineError> {
        let (node, connections) = self
            .graph
            .remove_node(node_id)
            .ok_or(EngineError::NoSuchNode(node_id))?;

        if let Some(test) = self.in_flight.remove(&node_id) {
            test.cancel.cancel();
        }
        self.touch();

        info!(
            "deleted {} node {} and {} connection(s)",
            node.kind,
            node_id,
            connections.len()
        );
        Ok(())
    }

    /// Add an edge for branch wiring or merges.
    ///
    /// # Errors
    /// `NoSuchNode`, `SelfLoop`, `TriggerHasInputs`, `DuplicateConnection`,
    /// `WouldCreateCycle` (when `source_id` is reachable from `target_id`).
    pub fn connect(&mut self, source_id: NodeId, target_id: NodeId) -> Result<ConnectionId, EngineError> {
        if let Err(e) = self.check_connect(source_id, target_id) {
            warn!("rejected connection {} → {}: {}", source_id, target_id, e);
            return Err(e);
        }

        let conn = self.graph.insert_connection(source_id, target_id)?;
        self.touch();
        info!("connected {} → {} ({})", source_id, target_id, conn);
        Ok(conn)
    }

    fn check_connect(&self, source_id: NodeId, target_id: NodeId) -> Result<(), EngineError> {
        self.node(source_id)?;
        let target = self.node(target_id)?;

        if source_id == target_id {
            return Err(EngineError::SelfLoop(source_id));
        }
        if target.is_trigger() {
            return Err(EngineError::TriggerHasInputs(target_id));
        }
        if self.graph.connection_between(source_id, target_id).is_some() {
            return Err(EngineError::DuplicateConnection { source_id, target_id });
        }
        if dag::reaches(&self.graph, target_id, source_id) {
            return Err(EngineError::WouldCreateCycle { source_id, target_id });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Run the validation rules over the current graph.
    pub fn validate(&self) -> Report {
        validation::validate(&self.graph)
    }

    /// Earlier steps whose output `node_id` can use, trigger first.
    pub fn ancestors_of(&self, node_id: NodeId) -> Result<Vec<&Node>, EngineError> {
        ancestry::ancestors_of(&self.graph, node_id)
    }

    pub fn is_testing(&self, node_id: NodeId) -> bool {
        self.in_flight.contains_key(&node_id)
    }

    // -----------------------------------------------------------------------
    // Node tests
    // -----------------------------------------------------------------------

    /// Start a test of `node_id` against `client` without waiting for it.
    ///
    /// Tests on different nodes are independent and may overlap. The node is
    /// `Running` until its outcome is applied by
    /// [`apply_pending_outcomes`](Self::apply_pending_outcomes) or
    /// [`settle_next_test`](Self::settle_next_test), or until
    /// [`cancel_test`](Self::cancel_test).
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// `NoSuchNode`, `NotTestable` (incomplete or already running).
    pub fn run_test(
        &mut self,
        node_id: NodeId,
        client: Arc<dyn IntegrationClient>,
    ) -> Result<TestHandle, EngineError> {
        let node = self.node(node_id)?;
        let status = self.next_status(node, StatusEvent::TestStarted)?;
        let request = self.test_request(node)?;

        let generation = self.next_generation;
        self.next_generation += 1;

        let (handle, in_flight) = testing::spawn_test(
            client,
            request,
            node_id,
            generation,
            self.config.test_timeout,
            self.outcome_tx.clone(),
        );
        self.in_flight.insert(node_id, in_flight);

        if let Some(node) = self.graph.node_mut(node_id) {
            node.status = status;
            node.failure = None;
        }
        info!("started test of {} (generation {})", node_id, generation);
        Ok(handle)
    }

    fn test_request(&self, node: &Node) -> Result<TestRequest, EngineError> {
        let operation_id = node.operation_id.clone().ok_or(EngineError::NotTestable {
            node_id: node.id,
            status: node.status,
        })?;

        let mut input = Map::new();
        for ancestor in self.ancestors_of(node.id)? {
            if let Some(sample) = &ancestor.sample_output {
                input.insert(ancestor.id.to_string(), sample.clone());
            }
        }

        Ok(TestRequest {
            workflow_id: self.workflow_id,
            node_id: node.id.0,
            integration_id: node.integration_id.clone(),
            operation_id,
            config: node.config.clone(),
            credential_id: node.credential_id.clone(),
            input: Value::Object(input),
        })
    }

    /// Cancel the running test of `node_id`, marking it `Failed(Cancelled)`
    /// immediately. Returns `false` if no test was running.
    pub fn cancel_test(&mut self, node_id: NodeId) -> Result<bool, EngineError> {
        self.node(node_id)?;
        let Some(test) = self.in_flight.remove(&node_id) else {
            return Ok(false);
        };
        test.cancel.cancel();

        self.finish(node_id, Err(FailureReason::Cancelled), Utc::now());
        info!("cancelled test of {} (generation {})", node_id, test.generation);
        Ok(true)
    }

    /// Apply a finished test if it is still current. Returns `false` for a
    /// stale outcome (node cancelled, re-tested, or deleted since).
    pub fn apply_outcome(&mut self, outcome: TestOutcome) -> bool {
        let current = self
            .in_flight
            .get(&outcome.node_id)
            .map_or(false, |t| t.generation == outcome.generation);
        if !current {
            debug!(
                "discarding stale outcome for {} (generation {})",
                outcome.node_id, outcome.generation
            );
            return false;
        }

        self.in_flight.remove(&outcome.node_id);
        self.finish(outcome.node_id, outcome.result, outcome.finished_at);
        true
    }

    /// Apply every outcome that has already arrived. Returns how many were current.
    pub fn apply_pending_outcomes(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if self.apply_outcome(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next current outcome and apply it. Returns `None` once no
    /// test is in flight.
    pub async fn settle_next_test(&mut self) -> Option<NodeId> {
        loop {
            if self.in_flight.is_empty() {
                self.apply_pending_outcomes();
                return None;
            }
            let outcome = self.outcome_rx.recv().await?;
            let node_id = outcome.node_id;
            if self.apply_outcome(outcome) {
                return Some(node_id);
            }
        }
    }

    /// Wait for every in-flight test to finish and apply the outcomes.
    pub async fn settle_all_tests(&mut self) {
        while self.settle_next_test().await.is_some() {}
    }

    fn finish(&mut self, node_id: NodeId, result: Result<Value, FailureReason>, at: DateTime<Utc>) {
        let Some(node) = self.graph.node_mut(node_id) else {
            return;
        };
        let event = match result {
            Ok(_) => StatusEvent::TestSucceeded,
            Err(_) => StatusEvent::TestFailed,
        };
        let Some(status) = node.status.next(event) else {
            debug!("ignoring outcome for {} in state {}", node_id, node.status);
            return;
        };

        node.status = status;
        node.last_tested_at = Some(at);
        match result {
            Ok(output) => {
                node.sample_output = Some(output);
                node.failure = None;
            }
            Err(reason) => {
                warn!("test of {} failed: {}", node_id, reason);
                node.failure = Some(reason);
            }
        }
        self.touch();
    }
}

fn role_of(kind: NodeKind) -> Role {
    match kind {
        NodeKind::Trigger => Role::Trigger,
        NodeKind::Action | NodeKind::Condition => Role::Action,
    }
}

fn reset_test_results(node: &mut Node, status: NodeStatus) {
    node.status = status;
    node.failure = None;
    node.sample_output = None;
}
