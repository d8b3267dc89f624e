//! `integrations` crate: the Capability Registry and the client contract
//! used to test a configured node against its integration.
//!
//! The engine only ever reads integration metadata through
//! [`CapabilityRegistry`]; catalog contents are data, loaded once at start-up.

pub mod error;
pub mod schema;
pub mod registry;
pub mod client;
pub mod mock;

pub use error::{IntegrationError, RegistryError};
pub use schema::{
    ConfigCheck, FieldIssue, FieldProblem, FieldSpec, FieldType, IntegrationSpec, OperationSchema,
    Role,
};
pub use registry::{CapabilityRegistry, StaticRegistry, CONDITION_INTEGRATION, MANUAL_OPERATION};
pub use client::{IntegrationClient, SimulatedClient, TestRequest};
