//! Validation engine: a pure, from-scratch pass over the graph.
//!
//! Graphs are small (tens of nodes), so the report is recomputed on demand
//! rather than maintained incrementally. `validate` never fails; even the
//! empty graph yields a report.

use serde::{Deserialize, Serialize};

use crate::graph::WorkflowGraph;
use crate::models::{NodeId, NodeKind};
use crate::status::NodeStatus;

/// How serious an [`Issue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Stable identifier of the rule that produced the issue.
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

impl Issue {
    fn new(severity: Severity, code: &str, node_id: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            node_id,
            code: code.to_owned(),
            message: message.into(),
            severity,
        }
    }
}

/// Aggregated result of validating a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    /// Informational findings; they never block execution on their own.
    pub notices: Vec<Issue>,
    /// `true` iff the graph is non-empty and there are no errors.
    pub can_execute: bool,
}

impl Report {
    /// Every issue that mentions `node_id`.
    pub fn issues_for(&self, node_id: NodeId) -> impl Iterator<Item = &Issue> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.notices)
            .filter(move |i| i.node_id == Some(node_id))
    }
}

pub const MISSING_TRIGGER: &str = "missing_trigger";
pub const MISSING_CONFIGURATION: &str = "missing_configuration";
pub const DISCONNECTED_NODE: &str = "disconnected_node";
pub const DANGLING_BRANCH: &str = "dangling_branch";
pub const EMPTY_WORKFLOW: &str = "empty_workflow";
pub const TEST_FAILED: &str = "test_failed";

/// Run every rule over `graph`. Issues are listed in node insertion order.
pub fn validate(graph: &WorkflowGraph) -> Report {
    let mut issues = Vec::new();

    if graph.is_empty() {
        issues.push(Issue::new(
            Severity::Info,
            EMPTY_WORKFLOW,
            None,
            "Workflow is empty; add a trigger to get started",
        ));
    } else if graph.trigger().is_none() {
        issues.push(Issue::new(
            Severity::Error,
            MISSING_TRIGGER,
            None,
            "Workflow has no trigger",
        ));
    }

    for node in graph.all_nodes() {
        if node.status == NodeStatus::Incomplete {
            issues.push(Issue::new(
                Severity::Error,
                MISSING_CONFIGURATION,
                Some(node.id),
                "Missing configuration",
            ));
        }

        let incoming = graph.incoming(node.id).len();
        if node.kind != NodeKind::Trigger && incoming == 0 {
            issues.push(Issue::new(
                Severity::Error,
                DISCONNECTED_NODE,
                Some(node.id),
                "Step is not connected to an earlier step",
            ));
        }

        if node.kind == NodeKind::Condition {
            let branches = graph.outgoing(node.id).len();
            if branches < 2 {
                issues.push(Issue::new(
                    Severity::Warning,
                    DANGLING_BRANCH,
                    Some(node.id),
                    format!("Condition has {branches} of 2 branches connected"),
                ));
            }
        }

        if node.status == NodeStatus::Failed {
            let reason = node
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown reason".to_owned());
            issues.push(Issue::new(
                Severity::Warning,
                TEST_FAILED,
                Some(node.id),
                format!("Last test failed: {reason}"),
            ));
        }
    }

    let mut report = Report {
        errors: Vec::new(),
        warnings: Vec::new(),
        notices: Vec::new(),
        can_execute: false,
    };
    for issue in issues {
        match issue.severity {
            Severity::Error => report.errors.push(issue),
            Severity::Warning => report.warnings.push(issue),
            Severity::Info => report.notices.push(issue),
        }
    }
    report.can_execute = !graph.is_empty() && report.errors.is_empty();
    report
}
