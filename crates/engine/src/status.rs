//! Node execution state machine.
//!
//! ```text
//! Incomplete ──configure(complete)──▶ Configured ──start──▶ Running ──▶ Success
//!      ▲                                  ▲                    │
//!      └──────configure(incomplete)───────┤                    └──▶ Failed
//!                                         └── configure ◀── Success | Failed
//! ```
//!
//! `Success` and `Failed` can be re-tested directly. Nothing is terminal.

use serde::{Deserialize, Serialize};

/// Per-node lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Incomplete,
    Configured,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete"),
            Self::Configured => write!(f, "configured"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a node test ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// No completion arrived within the configured test timeout.
    Timeout,
    /// The test was cancelled before it completed.
    Cancelled,
    /// The integration reported a failure.
    Integration { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Integration { message } => write!(f, "{message}"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The node's operation, config or credential changed.
    Reconfigured { complete: bool },
    /// A test run was started.
    TestStarted,
    TestSucceeded,
    /// Integration failure, timeout, or cancellation.
    TestFailed,
}

impl NodeStatus {
    /// Apply `event`, returning the next state or `None` if the event is not
    /// legal in the current state.
    pub fn next(self, event: StatusEvent) -> Option<NodeStatus> {
        use NodeStatus::*;
        use StatusEvent::*;

        match (self, event) {
            (Running, Reconfigured { .. }) => None,
            (_, Reconfigured { complete: true }) => Some(Configured),
            (_, Reconfigured { complete: false }) => Some(Incomplete),

            (Configured | Success | Failed, TestStarted) => Some(Running),
            (Incomplete | Running, TestStarted) => None,

            (Running, TestSucceeded) => Some(Success),
            (Running, TestFailed) => Some(Failed),
            (_, TestSucceeded | TestFailed) => None,
        }
    }

    pub fn is_running(self) -> bool {
        self == NodeStatus::Running
    }
}
