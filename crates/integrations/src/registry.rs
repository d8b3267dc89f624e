//! The Capability Registry: a read-only catalog of which operations each
//! integration supports and which fields they take.
//!
//! The catalog is data, not code: it is deserialised once at start-up from
//! JSON (the embedded built-in catalog or a file given on the command line)
//! and then only read through [`CapabilityRegistry`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::schema::{IntegrationSpec, OperationSchema, Role};
use crate::RegistryError;

/// Integration ID reserved for condition (branch) nodes.
pub const CONDITION_INTEGRATION: &str = "condition";

/// Trigger operation that needs no credential: the user starts the run by hand.
pub const MANUAL_OPERATION: &str = "manual";

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.json");

/// Read interface the engine depends on.
pub trait CapabilityRegistry: Send + Sync {
    /// Look up an integration by ID.
    fn integration(&self, integration_id: &str) -> Option<&IntegrationSpec>;

    /// Every integration, ordered by ID.
    fn integrations(&self) -> Vec<&IntegrationSpec>;

    /// Operations of `integration_id` with the given role (empty when unknown).
    fn operations(&self, integration_id: &str, role: Role) -> Vec<&OperationSchema> {
        self.integration(integration_id)
            .map(|spec| spec.operations.iter().filter(|op| op.role == role).collect())
            .unwrap_or_default()
    }

    fn operation(&self, integration_id: &str, operation_id: &str) -> Option<&OperationSchema> {
        self.integration(integration_id)
            .and_then(|spec| spec.operation(operation_id))
    }

    /// Returns `true` if the integration can start a workflow.
    fn supports_trigger(&self, integration_id: &str) -> bool {
        !self.operations(integration_id, Role::Trigger).is_empty()
    }
}

#[derive(Deserialize)]
struct Catalog {
    integrations: Vec<IntegrationSpec>,
}

/// In-memory registry built from a JSON catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    integrations: BTreeMap<String, IntegrationSpec>,
}

impl StaticRegistry {
    /// Build a registry from already-parsed specs.
    ///
    /// # Errors
    /// Rejects empty IDs, duplicate integrations, and duplicate operations
    /// within one integration.
    pub fn new(specs: Vec<IntegrationSpec>) -> Result<Self, RegistryError> {
        let mut integrations = BTreeMap::new();

        for spec in specs {
            if spec.id.trim().is_empty() {
                return Err(RegistryError::EmptyIdentifier);
            }

            let mut seen_ops = HashSet::new();
            for op in &spec.operations {
                if op.id.trim().is_empty() {
                    return Err(RegistryError::EmptyIdentifier);
                }
                if !seen_ops.insert(op.id.as_str()) {
                    return Err(RegistryError::DuplicateOperation {
                        integration_id: spec.id.clone(),
                        operation_id: op.id.clone(),
                    });
                }
            }

            if integrations.contains_key(&spec.id) {
                return Err(RegistryError::DuplicateIntegration(spec.id));
            }
            integrations.insert(spec.id.clone(), spec);
        }

        Ok(Self { integrations })
    }

    /// Parse a catalog document of the form `{ "integrations": [ ... ] }`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        Self::new(catalog.integrations)
    }

    /// Load a catalog file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&content)?;
        info!(
            "loaded {} integrations from {}",
            registry.integrations.len(),
            path.display()
        );
        Ok(registry)
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}

impl CapabilityRegistry for StaticRegistry {
    fn integration(&self, integration_id: &str) -> Option<&IntegrationSpec> {
        self.integrations.get(integration_id)
    }

    fn integrations(&self) -> Vec<&IntegrationSpec> {
        self.integrations.values().collect()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let registry = StaticRegistry::builtin().expect("embedded catalog is valid");
        assert!(registry.supports_trigger("webhook"));
        assert!(registry.supports_trigger("manual"));
        assert!(!registry.supports_trigger("email"));
        assert!(registry.operation("email", "send").is_some());
        assert!(registry.integration(CONDITION_INTEGRATION).is_some());
    }

    #[test]
    fn unknown_integration_has_no_operations() {
        let registry = StaticRegistry::builtin().unwrap();
        assert!(registry.operations("does-not-exist", Role::Action).is_empty());
        assert!(!registry.supports_trigger("does-not-exist"));
    }

    #[test]
    fn duplicate_integration_is_rejected() {
        let json = r#"{ "integrations": [ { "id": "a" }, { "id": "a" } ] }"#;
        assert!(matches!(
            StaticRegistry::from_json(json),
            Err(RegistryError::DuplicateIntegration(id)) if id == "a"
        ));
    }

    #[test]
    fn duplicate_operation_is_rejected() {
        let json = r#"{ "integrations": [ { "id": "a", "operations": [
            { "id": "x", "role": "action" },
            { "id": "x", "role": "trigger" }
        ] } ] }"#;
        assert!(matches!(
            StaticRegistry::from_json(json),
            Err(RegistryError::DuplicateOperation { operation_id, .. }) if operation_id == "x"
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            StaticRegistry::from_json("{ not json"),
            Err(RegistryError::Json(_))
        ));
    }
}
