//! Integration-level error types.

use thiserror::Error;

/// Errors returned by an [`IntegrationClient`](crate::IntegrationClient) test call.
///
/// Both variants end up recorded on the node as a failed test; the split only
/// tells the user whether resubmitting unchanged could help.
/// - `Rejected`: the integration answered and refused the request.
/// - `Unreachable`: the integration could not be contacted at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrationError {
    /// The integration processed the call and reported a failure.
    #[error("integration rejected the request: {0}")]
    Rejected(String),

    /// Transport-level failure; the integration never saw the request.
    #[error("integration unreachable: {0}")]
    Unreachable(String),
}

/// Errors produced while loading a capability catalog.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Two catalog entries share the same integration ID.
    #[error("duplicate integration ID: '{0}'")]
    DuplicateIntegration(String),

    /// An integration declares the same operation twice.
    #[error("integration '{integration_id}' declares operation '{operation_id}' twice")]
    DuplicateOperation {
        integration_id: String,
        operation_id: String,
    },

    #[error("catalog entry has an empty identifier")]
    EmptyIdentifier,
}
