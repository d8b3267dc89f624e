//! Tests for the mutation service and node test runs.
//!
//! These use the built-in capability catalog and `MockClient`, so no real
//! integration is contacted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use integrations::mock::MockClient;
use integrations::{FieldProblem, StaticRegistry};

use crate::validation::{DANGLING_BRANCH, DISCONNECTED_NODE, EMPTY_WORKFLOW, MISSING_TRIGGER};
use crate::{
    dag, EditorConfig, EngineError, FailureReason, NodeId, NodeKind, NodeStatus, TestOutcome,
    WorkflowEditor, WorkflowGraph,
};

fn editor() -> WorkflowEditor {
    editor_with(EditorConfig::default())
}

fn editor_with(config: EditorConfig) -> WorkflowEditor {
    let registry = StaticRegistry::builtin().expect("builtin catalog");
    WorkflowEditor::new("test-flow", Arc::new(registry), config)
}

fn cfg(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("config must be an object")
}

/// Trigger (configured webhook) → email action (configured).
fn configured_pair(ed: &mut WorkflowEditor) -> (NodeId, NodeId) {
    let trigger = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    ed.update_node_config(trigger, "receive", cfg(json!({ "path": "/hook" })))
        .unwrap();
    let action = ed.add_node(NodeKind::Action, "email", None).unwrap();
    ed.update_node_config(action, "send", cfg(json!({ "to": "a@b.com", "subject": "hi" })))
        .unwrap();
    (trigger, action)
}

/// Structural invariants that hold after every editor call.
fn assert_invariants(graph: &WorkflowGraph) {
    let triggers: Vec<_> = graph.all_nodes().iter().filter(|n| n.is_trigger()).collect();
    assert!(triggers.len() <= 1, "more than one trigger");
    if let Some(trigger) = triggers.first() {
        assert!(graph.incoming(trigger.id).is_empty(), "trigger has inputs");
    }

    let node_ids: HashSet<_> = graph.all_nodes().iter().map(|n| n.id).collect();
    assert_eq!(node_ids.len(), graph.len(), "duplicate node id");
    let conn_ids: HashSet<_> = graph.all_connections().iter().map(|c| c.id).collect();
    assert_eq!(conn_ids.len(), graph.all_connections().len(), "duplicate connection id");

    for conn in graph.all_connections() {
        assert!(node_ids.contains(&conn.source_id));
        assert!(node_ids.contains(&conn.target_id));
        assert_ne!(conn.source_id, conn.target_id);
    }

    assert!(dag::topological_order(graph).is_ok(), "graph has a cycle");
}

// ============================================================
// Worked scenarios
// ============================================================

#[test]
fn webhook_to_email_becomes_executable() {
    let mut ed = editor();

    let node1 = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    assert_eq!(ed.graph().get_node(node1).unwrap().status, NodeStatus::Incomplete);

    let updated = ed
        .update_node_config(node1, "receive", cfg(json!({ "path": "/hook" })))
        .unwrap();
    assert_eq!(updated.status, NodeStatus::Configured);

    let node2 = ed.add_node(NodeKind::Action, "email", None).unwrap();
    assert!(ed.graph().connection_between(node1, node2).is_some());
    assert_eq!(ed.graph().get_node(node2).unwrap().status, NodeStatus::Incomplete);

    let report = ed.validate();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].node_id, Some(node2));
    assert_eq!(report.errors[0].message, "Missing configuration");
    assert!(!report.can_execute);

    let updated = ed
        .update_node_config(node2, "send", cfg(json!({ "to": "a@b.com", "subject": "hi" })))
        .unwrap();
    assert_eq!(updated.status, NodeStatus::Configured);

    let report = ed.validate();
    assert!(report.errors.is_empty());
    assert!(report.can_execute);
}

#[test]
fn action_first_is_rejected_and_graph_stays_empty() {
    let mut ed = editor();

    assert_eq!(
        ed.add_node(NodeKind::Action, "email", None),
        Err(EngineError::NotATrigger { integration_id: "email".into() })
    );
    assert!(ed.graph().is_empty());

    let report = ed.validate();
    assert_eq!(report.notices.len(), 1);
    assert_eq!(report.notices[0].code, EMPTY_WORKFLOW);
    assert!(!report.can_execute);
}

#[test]
fn trigger_on_action_only_integration_is_not_a_trigger() {
    let mut ed = editor();
    assert!(matches!(
        ed.add_node(NodeKind::Trigger, "email", None),
        Err(EngineError::NotATrigger { .. })
    ));
    assert!(matches!(
        ed.add_node(NodeKind::Trigger, "no-such-integration", None),
        Err(EngineError::NotATrigger { .. })
    ));
    assert!(ed.graph().is_empty());
}

#[test]
fn second_trigger_is_rejected() {
    let mut ed = editor();
    ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    let before = ed.graph().clone();

    assert_eq!(
        ed.add_node(NodeKind::Trigger, "schedule", None),
        Err(EngineError::TriggerAlreadyConfigured)
    );
    assert_eq!(ed.graph(), &before);
}

#[test]
fn action_on_unknown_or_trigger_only_integration_is_rejected() {
    let mut ed = editor();
    ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();

    assert_eq!(
        ed.add_node(NodeKind::Action, "nope", None),
        Err(EngineError::UnknownIntegration("nope".into()))
    );
    assert!(matches!(
        ed.add_node(NodeKind::Action, "schedule", None),
        Err(EngineError::RoleNotSupported { .. })
    ));
    assert_eq!(ed.graph().len(), 1);
}

#[test]
fn nodes_chain_from_the_most_recent_node() {
    let mut ed = editor();
    let a = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    let b = ed.add_node(NodeKind::Action, "email", None).unwrap();
    let c = ed.add_node(NodeKind::Action, "http", None).unwrap();

    assert!(ed.graph().connection_between(a, b).is_some());
    assert!(ed.graph().connection_between(b, c).is_some());
    assert_eq!(ed.graph().all_connections().len(), 2);

    // Deleting the tail makes the previous node "most recent" again.
    ed.delete_node(c).unwrap();
    let d = ed.add_node(NodeKind::Action, "http", None).unwrap();
    assert!(ed.graph().connection_between(b, d).is_some());
    assert!(d.0 > c.0, "ids are never reused");
}

// ============================================================
// Conditions and wiring
// ============================================================

#[test]
fn condition_with_both_branches_and_merge() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    let cond = ed.add_condition(action).unwrap();
    assert_eq!(ed.graph().get_node(cond).unwrap().kind, NodeKind::Condition);
    assert!(ed.graph().connection_between(action, cond).is_some());
    assert_eq!(ed.validate().warnings[0].code, DANGLING_BRANCH);

    let yes = ed.add_node(NodeKind::Action, "email", None).unwrap();
    let no = ed.add_node_after(cond, NodeKind::Action, "http", None).unwrap();
    assert!(ed.graph().connection_between(cond, yes).is_some());
    assert!(ed.graph().connection_between(cond, no).is_some());

    let merge = ed.add_node_after(yes, NodeKind::Action, "email", None).unwrap();
    ed.connect(no, merge).unwrap();
    assert_eq!(ed.graph().incoming(merge).len(), 2);

    let report = ed.validate();
    assert!(report.warnings.iter().all(|w| w.code != DANGLING_BRANCH));
    assert_invariants(ed.graph());
}

#[test]
fn add_condition_after_missing_node_fails() {
    let mut ed = editor();
    ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    let before = ed.graph().clone();

    assert_eq!(ed.add_condition(NodeId(99)), Err(EngineError::NoSuchNode(NodeId(99))));
    assert_eq!(ed.graph(), &before);
}

#[test]
fn connect_rejects_cycles_found_by_ancestry() {
    let mut ed = editor();
    let a = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    let b = ed.add_node(NodeKind::Action, "email", None).unwrap();
    let c = ed.add_node(NodeKind::Action, "http", None).unwrap();

    let ancestors: Vec<NodeId> = ed.ancestors_of(c).unwrap().iter().map(|n| n.id).collect();
    assert!(ancestors.contains(&b));

    let before = ed.graph().clone();
    assert_eq!(
        ed.connect(c, b),
        Err(EngineError::WouldCreateCycle { source_id: c, target_id: b })
    );
    assert_eq!(ed.connect(b, b), Err(EngineError::SelfLoop(b)));
    assert_eq!(ed.connect(c, a), Err(EngineError::TriggerHasInputs(a)));
    assert_eq!(
        ed.connect(a, b),
        Err(EngineError::DuplicateConnection { source_id: a, target_id: b })
    );
    assert_eq!(ed.connect(a, NodeId(77)), Err(EngineError::NoSuchNode(NodeId(77))));
    assert_eq!(ed.graph(), &before);

    // A forward edge that skips a step is fine.
    ed.connect(a, c).unwrap();
    assert_invariants(ed.graph());
}

#[test]
fn add_node_after_cannot_attach_a_trigger() {
    let mut ed = editor();
    let a = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();
    ed.delete_node(a).unwrap();
    let b = ed.add_node(NodeKind::Trigger, "manual", None).unwrap();

    assert!(matches!(
        ed.add_node_after(b, NodeKind::Trigger, "webhook", None),
        Err(EngineError::TriggerAlreadyConfigured)
    ));
}

// ============================================================
// Deletion
// ============================================================

#[test]
fn delete_removes_node_and_exactly_its_connections() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    let cond = ed.add_condition(action).unwrap();
    let yes = ed.add_node(NodeKind::Action, "email", None).unwrap();
    let no = ed.add_node_after(cond, NodeKind::Action, "http", None).unwrap();

    let touching = ed
        .graph()
        .all_connections()
        .iter()
        .filter(|c| c.touches(cond))
        .count();
    assert_eq!(touching, 3);
    let total = ed.graph().all_connections().len();

    ed.delete_node(cond).unwrap();

    assert!(ed.graph().get_node(cond).is_none());
    assert_eq!(ed.graph().all_connections().len(), total - touching);

    assert!(ed
        .graph()
        .all_connections()
        .iter()
        .all(|c| ed.graph().contains(c.source_id) && ed.graph().contains(c.target_id)));

    let report = ed.validate();
    let disconnected: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.code == DISCONNECTED_NODE)
        .filter_map(|e| e.node_id)
        .collect();
    assert_eq!(disconnected, vec![yes, no]);
    assert_eq!(ed.delete_node(cond), Err(EngineError::NoSuchNode(cond)));
}

#[test]
fn deleting_the_trigger_reapplies_the_trigger_rule() {
    let mut ed = editor();
    let (trigger, action) = configured_pair(&mut ed);

    ed.delete_node(trigger).unwrap();
    assert_eq!(ed.validate().errors[0].code, MISSING_TRIGGER);

    assert!(matches!(
        ed.add_node(NodeKind::Action, "http", None),
        Err(EngineError::NotATrigger { .. })
    ));

    let new_trigger = ed.add_node(NodeKind::Trigger, "manual", None).unwrap();
    assert!(ed.graph().incoming(new_trigger).is_empty());
    ed.connect(new_trigger, action).unwrap();
    ed.update_node_config(new_trigger, "manual", Map::new()).unwrap();

    assert!(ed.validate().can_execute);
}

// ============================================================
// Configuration
// ============================================================

#[test]
fn invalid_fields_are_reported_and_nothing_changes() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    let before = ed.graph().clone();

    let err = ed
        .update_node_config(action, "send", cfg(json!({ "to": 42, "subject": "x", "bcc": "y" })))
        .unwrap_err();

    match err {
        EngineError::InvalidField(issues) => {
            assert_eq!(issues.len(), 2);
            assert!(issues
                .iter()
                .any(|i| i.field == "bcc" && i.problem == FieldProblem::UnknownField));
            assert!(issues.iter().any(|i| i.field == "to"));
        }
        other => panic!("expected InvalidField, got {other:?}"),
    }
    assert_eq!(ed.graph(), &before);
}

#[test]
fn unknown_or_wrong_role_operation_is_rejected() {
    let mut ed = editor();
    let trigger = ed.add_node(NodeKind::Trigger, "slack", None).unwrap();

    assert!(matches!(
        ed.update_node_config(trigger, "post_message", Map::new()),
        Err(EngineError::UnknownOperation { .. })
    ));
    assert!(matches!(
        ed.update_node_config(trigger, "missing", Map::new()),
        Err(EngineError::UnknownOperation { .. })
    ));
    assert_eq!(
        ed.update_node_config(NodeId(50), "receive", Map::new()),
        Err(EngineError::NoSuchNode(NodeId(50)))
    );
}

#[test]
fn partial_config_keeps_node_incomplete() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    let node = ed
        .update_node_config(action, "send", cfg(json!({ "to": "a@b.com" })))
        .unwrap();
    assert_eq!(node.status, NodeStatus::Incomplete);
    assert!(!ed.validate().can_execute);
}

#[test]
fn auth_required_integration_needs_a_credential() {
    let mut ed = editor();
    let trigger = ed.add_node(NodeKind::Trigger, "manual", None).unwrap();
    let node = ed.update_node_config(trigger, "manual", Map::new()).unwrap();
    assert_eq!(node.status, NodeStatus::Configured, "manual trigger needs no credential");

    let slack = ed.add_node(NodeKind::Action, "slack", None).unwrap();
    let node = ed
        .update_node_config(slack, "post_message", cfg(json!({ "channel": "#ops", "text": "hi" })))
        .unwrap();
    assert_eq!(node.status, NodeStatus::Incomplete);

    let node = ed.set_credential(slack, Some("cred-slack".into())).unwrap();
    assert_eq!(node.status, NodeStatus::Configured);

    let node = ed.set_credential(slack, None).unwrap();
    assert_eq!(node.status, NodeStatus::Incomplete);
}

// ============================================================
// Documents
// ============================================================

#[test]
fn document_round_trips_through_json() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    ed.add_condition(action).unwrap();

    let json = serde_json::to_value(ed.to_document()).unwrap();
    assert_eq!(json["flowName"], "test-flow");
    assert_eq!(json["nodes"][1]["integrationId"], "email");
    assert_eq!(json["connections"][0]["sourceId"], 1);

    let doc = serde_json::from_value(json).unwrap();
    let registry = Arc::new(StaticRegistry::builtin().unwrap());
    let mut loaded = WorkflowEditor::from_document(&doc, registry, EditorConfig::default()).unwrap();

    assert_eq!(loaded.graph().all_nodes(), ed.graph().all_nodes());
    let next = loaded.add_node(NodeKind::Action, "http", None).unwrap();
    assert_eq!(next, NodeId(4));
}

fn load(doc: Value) -> Result<WorkflowEditor, EngineError> {
    let doc = serde_json::from_value(doc).expect("well-formed document");
    let registry = Arc::new(StaticRegistry::builtin().unwrap());
    WorkflowEditor::from_document(&doc, registry, EditorConfig::default())
}

#[test]
fn loading_checks_integrations_against_the_registry() {
    let forged_trigger = load(json!({
        "flowName": "forged",
        "nodes": [{ "id": 1, "kind": "trigger", "integrationId": "email", "status": "configured" }],
        "connections": []
    }));
    assert_eq!(
        forged_trigger.unwrap_err(),
        EngineError::NotATrigger { integration_id: "email".into() }
    );

    let unknown_action = load(json!({
        "flowName": "forged",
        "nodes": [
            { "id": 1, "kind": "trigger", "integrationId": "manual", "status": "incomplete" },
            { "id": 2, "kind": "action", "integrationId": "no-such", "status": "success" }
        ],
        "connections": [{ "id": 1, "sourceId": 1, "targetId": 2 }]
    }));
    assert_eq!(unknown_action.unwrap_err(), EngineError::UnknownIntegration("no-such".into()));

    let bad_field = load(json!({
        "flowName": "forged",
        "nodes": [{
            "id": 1, "kind": "trigger", "integrationId": "webhook", "operationId": "receive",
            "config": { "path": "/x", "bogus": true }, "status": "configured"
        }],
        "connections": []
    }));
    assert!(matches!(bad_field, Err(EngineError::InvalidField(_))));
}

#[test]
fn loading_recomputes_statuses_from_config() {
    let ed = load(json!({
        "flowName": "forged",
        "nodes": [
            { "id": 1, "kind": "trigger", "integrationId": "manual", "operationId": "manual", "status": "incomplete" },
            { "id": 2, "kind": "action", "integrationId": "email", "status": "success", "sampleOutput": { "x": 1 } },
            {
                "id": 3, "kind": "action", "integrationId": "http", "operationId": "request",
                "config": { "url": "https://example.com", "method": "GET" }, "status": "failed",
                "failure": { "reason": "timeout" }
            }
        ],
        "connections": [
            { "id": 1, "sourceId": 1, "targetId": 2 },
            { "id": 2, "sourceId": 2, "targetId": 3 }
        ]
    }))
    .unwrap();

    let status = |id| ed.graph().get_node(NodeId(id)).unwrap().status;
    assert_eq!(status(1), NodeStatus::Configured);
    assert_eq!(status(2), NodeStatus::Incomplete);
    assert!(ed.graph().get_node(NodeId(2)).unwrap().sample_output.is_none());
    assert_eq!(status(3), NodeStatus::Failed);

    let report = ed.validate();
    assert!(!report.can_execute);
    assert_eq!(report.issues_for(NodeId(2)).count(), 1);
}

// ============================================================
// Random operation sequences
// ============================================================

/// Small deterministic generator so the sequence is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}

#[test]
fn invariants_hold_across_random_operations() {
    let integrations = ["email", "http", "slack", "webhook", "bogus", "condition"];
    let kinds = [NodeKind::Trigger, NodeKind::Action, NodeKind::Condition];

    for seed in 1..20u64 {
        let mut ed = editor();
        let mut rng = Lcg(seed);

        for _ in 0..60 {
            let ids: Vec<NodeId> = ed.graph().all_nodes().iter().map(|n| n.id).collect();
            let pick = |rng: &mut Lcg| {
                if ids.is_empty() {
                    NodeId(1)
                } else {
                    ids[rng.next(ids.len())]
                }
            };
            let before = ed.graph().clone();
            let existed_before = ed.graph().len();

            let result: Result<Option<NodeId>, EngineError> = match rng.next(6) {
                0 => {
                    let integration = if ed.graph().trigger().is_none() {
                        ["webhook", "manual", "email"][rng.next(3)]
                    } else {
                        integrations[rng.next(integrations.len())]
                    };
                    ed.add_node(kinds[rng.next(3)], integration, None).map(Some)
                }
                1 => {
                    let after = pick(&mut rng);
                    ed.add_condition(after).map(Some)
                }
                2 => {
                    let (a, b) = (pick(&mut rng), pick(&mut rng));
                    ed.connect(a, b).map(|_| None)
                }
                3 => {
                    let victim = pick(&mut rng);
                    ed.delete_node(victim).map(|_| None)
                }
                4 => {
                    let source = pick(&mut rng);
                    let integration = integrations[rng.next(integrations.len())];
                    ed.add_node_after(source, NodeKind::Action, integration, None).map(Some)
                }
                _ => {
                    let target = pick(&mut rng);
                    ed.update_node_config(target, "send", cfg(json!({ "to": "a@b.com" })))
                        .map(|_| None)
                }
            };

            assert_invariants(ed.graph());
            match result {
                Err(_) => assert_eq!(ed.graph(), &before, "failed call mutated the graph"),
                Ok(Some(added)) => {
                    assert_eq!(ed.graph().len(), existed_before + 1);
                    let node = ed.graph().get_node(added).unwrap();
                    if !node.is_trigger() {
                        assert!(!ed.graph().incoming(added).is_empty(), "new node is orphaned");
                    }
                }
                Ok(None) => {}
            }
            assert_eq!(ed.validate(), ed.validate());
        }
    }
}

// ============================================================
// Node tests (async)
// ============================================================

#[tokio::test]
async fn successful_test_records_sample_output() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    let client = Arc::new(MockClient::returning(json!({ "messageId": "m-1" })));

    let handle = ed.run_test(action, client.clone()).unwrap();
    assert_eq!(ed.graph().get_node(action).unwrap().status, NodeStatus::Running);
    assert!(ed.is_testing(action));

    handle.finished().await;
    assert_eq!(ed.apply_pending_outcomes(), 1);

    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.sample_output.as_ref().unwrap()["messageId"], "m-1");
    assert!(node.last_tested_at.is_some());
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn integration_failure_marks_node_failed() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    ed.run_test(action, Arc::new(MockClient::rejecting("mailbox full")))
        .unwrap();
    assert_eq!(ed.settle_next_test().await, Some(action));

    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.status, NodeStatus::Failed);
    assert!(matches!(
        &node.failure,
        Some(FailureReason::Integration { message }) if message.contains("mailbox full")
    ));

    // A failed test is a warning, not an error.
    let report = ed.validate();
    assert!(report.can_execute);
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_test_times_out() {
    let mut ed = editor_with(EditorConfig {
        test_timeout: Duration::from_secs(3),
    });
    let (_, action) = configured_pair(&mut ed);

    ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();
    ed.settle_all_tests().await;

    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.status, NodeStatus::Failed);
    assert_eq!(node.failure, Some(FailureReason::Timeout));
}

#[tokio::test]
async fn incomplete_node_cannot_be_tested() {
    let mut ed = editor();
    let trigger = ed.add_node(NodeKind::Trigger, "webhook", None).unwrap();

    assert_eq!(
        ed.run_test(trigger, Arc::new(MockClient::returning(json!({})))).unwrap_err(),
        EngineError::NotTestable { node_id: trigger, status: NodeStatus::Incomplete }
    );
}

#[tokio::test]
async fn running_node_rejects_reconfiguration_and_second_test() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();

    assert_eq!(
        ed.update_node_config(action, "send", cfg(json!({ "to": "c@d.com", "subject": "x" }))),
        Err(EngineError::NodeBusy(action))
    );
    assert_eq!(ed.set_credential(action, Some("c".into())), Err(EngineError::NodeBusy(action)));
    assert!(matches!(
        ed.run_test(action, Arc::new(MockClient::hanging())),
        Err(EngineError::NotTestable { status: NodeStatus::Running, .. })
    ));

    assert!(ed.cancel_test(action).unwrap());
}

#[tokio::test]
async fn cancel_marks_failed_and_discards_late_result() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    let slow = Arc::new(MockClient::returning(json!({ "late": true })).delayed(Duration::from_millis(50)));

    let handle = ed.run_test(action, slow).unwrap();
    let stale_generation = handle.generation();
    assert!(ed.cancel_test(action).unwrap());

    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.status, NodeStatus::Failed);
    assert_eq!(node.failure, Some(FailureReason::Cancelled));

    // A success arriving for the cancelled generation is ignored.
    let late = TestOutcome {
        node_id: action,
        generation: stale_generation,
        result: Ok(json!({ "late": true })),
        finished_at: chrono::Utc::now(),
    };
    assert!(!ed.apply_outcome(late));
    handle.finished().await;
    assert_eq!(ed.apply_pending_outcomes(), 0);
    assert_eq!(ed.graph().get_node(action).unwrap().status, NodeStatus::Failed);
    assert!(!ed.cancel_test(action).unwrap());
}

#[tokio::test]
async fn retest_after_cancel_only_applies_newest_generation() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    let first = ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();
    ed.cancel_test(action).unwrap();
    let second = ed
        .run_test(action, Arc::new(MockClient::returning(json!({ "ok": 1 }))))
        .unwrap();
    assert!(second.generation() > first.generation());

    ed.settle_all_tests().await;
    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.sample_output.as_ref().unwrap()["ok"], 1);
}

#[tokio::test]
async fn cancelling_through_the_handle_fails_the_node() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    let handle = ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();
    handle.cancel();
    assert_eq!(ed.settle_next_test().await, Some(action));

    let node = ed.graph().get_node(action).unwrap();
    assert_eq!(node.failure, Some(FailureReason::Cancelled));
}

#[tokio::test]
async fn tests_on_different_nodes_run_independently() {
    let mut ed = editor();
    let (trigger, action) = configured_pair(&mut ed);

    ed.run_test(trigger, Arc::new(MockClient::returning(json!({ "body": "x" })).delayed(Duration::from_millis(30))))
        .unwrap();
    ed.run_test(action, Arc::new(MockClient::unreachable("smtp down")))
        .unwrap();

    ed.settle_all_tests().await;
    assert_eq!(ed.graph().get_node(trigger).unwrap().status, NodeStatus::Success);
    assert_eq!(ed.graph().get_node(action).unwrap().status, NodeStatus::Failed);
    assert_eq!(ed.settle_next_test().await, None);
}

#[tokio::test]
async fn downstream_test_receives_ancestor_samples() {
    let mut ed = editor();
    let (trigger, action) = configured_pair(&mut ed);

    ed.run_test(trigger, Arc::new(MockClient::returning(json!({ "body": "hello" }))))
        .unwrap();
    ed.settle_all_tests().await;

    let client = Arc::new(MockClient::returning(json!({})));
    ed.run_test(action, client.clone()).unwrap();
    ed.settle_all_tests().await;

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls[0].input[trigger.to_string()]["body"], "hello");
    assert_eq!(calls[0].operation_id, "send");
}

#[tokio::test]
async fn deleting_a_running_node_drops_its_outcome() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);

    let handle = ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();
    ed.delete_node(action).unwrap();
    assert!(!ed.is_testing(action));

    handle.finished().await;
    assert_eq!(ed.apply_pending_outcomes(), 0);
    assert!(ed.graph().get_node(action).is_none());
}

#[tokio::test]
async fn reconfiguring_after_success_clears_the_sample() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    ed.run_test(action, Arc::new(MockClient::returning(json!({ "a": 1 }))))
        .unwrap();
    ed.settle_all_tests().await;

    let node = ed
        .update_node_config(action, "send", cfg(json!({ "to": "x@y.org", "subject": "new" })))
        .unwrap();
    assert_eq!(node.status, NodeStatus::Configured);
    assert!(node.sample_output.is_none());
}

#[tokio::test]
async fn dropping_the_editor_cancels_running_tests() {
    let mut ed = editor();
    let (_, action) = configured_pair(&mut ed);
    let handle = ed.run_test(action, Arc::new(MockClient::hanging())).unwrap();

    drop(ed);
    tokio::time::timeout(Duration::from_secs(1), handle.finished())
        .await
        .expect("test task stops once its editor is gone");
}
