//! Registry catalog: which schemas are valid for which registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("registry not found: {registry}")]
    RegistryNotFound { registry: String },

    #[error("schema not found in registry {registry}: {schema}")]
    SchemaNotFound { registry: String, schema: String },

    #[error("io error reading catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog file: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A named collection of cube/schema metadata the downstream processor
/// understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySpec {
    /// Caller-facing schema namespaces that gate which queries are valid
    pub schemas: Vec<String>,
}

/// The set of registries this gateway will dispatch for.
///
/// Registry names match exactly; schema names match case-insensitively, with
/// the catalog's casing treated as canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCatalog {
    registries: BTreeMap<String, RegistrySpec>,
}

impl RegistryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a registry and its schemas
    pub fn with_registry(mut self, name: impl Into<String>, schemas: &[&str]) -> Self {
        self.registries.insert(
            name.into(),
            RegistrySpec {
                schemas: schemas.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Load a catalog from a JSON file on disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = std::fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Resolve a (registry, schema) pair, returning the canonical schema name.
    ///
    /// Fails with a not-found error before any body is read or any work is
    /// submitted downstream.
    pub fn resolve(&self, registry: &str, schema: &str) -> Result<&str, CatalogError> {
        let spec = self
            .registries
            .get(registry)
            .ok_or_else(|| CatalogError::RegistryNotFound {
                registry: registry.to_string(),
            })?;
        spec.schemas
            .iter()
            .find(|s| s.eq_ignore_ascii_case(schema))
            .map(|s| s.as_str())
            .ok_or_else(|| CatalogError::SchemaNotFound {
                registry: registry.to_string(),
                schema: schema.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, RegistryCatalog};
    use pretty_assertions::assert_eq;

    fn catalog() -> RegistryCatalog {
        RegistryCatalog::new().with_registry("reg1", &["student", "Researcher"])
    }

    #[test]
    fn schema_resolution_is_case_insensitive() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("reg1", "student").unwrap(), "student");
        assert_eq!(catalog.resolve("reg1", "STUDENT").unwrap(), "student");
        assert_eq!(catalog.resolve("reg1", "researcher").unwrap(), "Researcher");
    }

    #[test]
    fn unknown_registry_and_schema_fail() {
        let catalog = catalog();
        assert!(matches!(
            catalog.resolve("nope", "student"),
            Err(CatalogError::RegistryNotFound { .. })
        ));
        assert!(matches!(
            catalog.resolve("reg1", "staff"),
            Err(CatalogError::SchemaNotFound { .. })
        ));
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let catalog = catalog();
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: RegistryCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, catalog);
    }
}
