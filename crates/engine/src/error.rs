//! Engine-level error types.

use integrations::{FieldIssue, Role};
use thiserror::Error;

use crate::models::{ConnectionId, NodeId};
use crate::status::NodeStatus;

/// Errors produced by the graph engine (mutation, document loading, tests).
///
/// Every error is raised before the graph is touched, so a failed call
/// leaves the workflow exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // ------ Structural errors ------

    /// The workflow has no trigger yet and the request would not supply one.
    #[error("workflow must start with a trigger; '{integration_id}' cannot be added here")]
    NotATrigger { integration_id: String },

    /// The workflow already has its trigger.
    #[error("workflow already has a trigger")]
    TriggerAlreadyConfigured,

    /// The requested edge would close a cycle.
    #[error("connecting {source_id} to {target_id} would create a cycle")]
    WouldCreateCycle { source_id: NodeId, target_id: NodeId },

    #[error("{0} cannot be connected to itself")]
    SelfLoop(NodeId),

    #[error("no such node: {0}")]
    NoSuchNode(NodeId),

    /// Triggers are entry points and never receive connections.
    #[error("trigger {0} cannot have incoming connections")]
    TriggerHasInputs(NodeId),

    #[error("{source_id} is already connected to {target_id}")]
    DuplicateConnection { source_id: NodeId, target_id: NodeId },

    #[error("unknown integration: '{0}'")]
    UnknownIntegration(String),

    /// The integration offers no operation for the requested kind of step.
    #[error("integration '{integration_id}' has no {role:?} operations")]
    RoleNotSupported { integration_id: String, role: Role },

    // ------ Document errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: {0}")]
    DuplicateNodeId(NodeId),

    #[error("duplicate connection ID: {0}")]
    DuplicateConnectionId(ConnectionId),

    /// A connection references a node ID that doesn't exist in the graph.
    #[error("{connection_id} references unknown node {node_id} ({side} side)")]
    UnknownNodeReference {
        connection_id: ConnectionId,
        node_id: NodeId,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    // ------ Configuration errors ------

    /// One or more config entries do not fit the operation's schema.
    #[error("invalid configuration: {}", join_issues(.0))]
    InvalidField(Vec<FieldIssue>),

    #[error("integration '{integration_id}' has no {role:?} operation '{operation_id}'")]
    UnknownOperation {
        integration_id: String,
        operation_id: String,
        role: Role,
    },

    // ------ State errors ------

    /// The node is being tested and cannot be changed until the test ends.
    #[error("{0} is busy running a test")]
    NodeBusy(NodeId),

    #[error("{node_id} cannot be tested while {status}")]
    NotTestable { node_id: NodeId, status: NodeStatus },
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Stable machine-readable code, used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotATrigger { .. } => "not_a_trigger",
            Self::TriggerAlreadyConfigured => "trigger_already_configured",
            Self::WouldCreateCycle { .. } => "would_create_cycle",
            Self::SelfLoop(_) => "self_loop",
            Self::NoSuchNode(_) => "no_such_node",
            Self::TriggerHasInputs(_) => "trigger_has_inputs",
            Self::DuplicateConnection { .. } => "duplicate_connection",
            Self::UnknownIntegration(_) => "unknown_integration",
            Self::RoleNotSupported { .. } => "role_not_supported",
            Self::DuplicateNodeId(_) => "duplicate_node_id",
            Self::DuplicateConnectionId(_) => "duplicate_connection_id",
            Self::UnknownNodeReference { .. } => "unknown_node_reference",
            Self::CycleDetected => "cycle_detected",
            Self::InvalidField(_) => "invalid_field",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::NodeBusy(_) => "node_busy",
            Self::NotTestable { .. } => "not_testable",
        }
    }
}
