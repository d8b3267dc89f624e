//! `engine` crate: the workflow graph model, its mutation rules, validation,
//! ancestry resolution, and the per-node test state machine.

pub mod models;
pub mod error;
pub mod status;
pub mod graph;
pub mod dag;
pub mod editor;
pub mod testing;
pub mod validation;
pub mod ancestry;

pub use models::{Connection, ConnectionId, Node, NodeId, NodeKind, Position, WorkflowDocument};
pub use error::EngineError;
pub use status::{FailureReason, NodeStatus};
pub use graph::WorkflowGraph;
pub use editor::{EditorConfig, WorkflowEditor};
pub use testing::{TestHandle, TestOutcome};
pub use validation::{validate, Issue, Report, Severity};
pub use ancestry::ancestors_of;

#[cfg(test)]
mod editor_tests;
