//! Terrace Google Cloud Provider
//!
//! Resource types for Google Cloud together with the migrators that keep
//! their persisted state readable as their layout evolves.
//!
//! ## Module Structure
//!
//! - `compute_instance` - Compute Engine instance schema and state migrations

pub mod compute_instance;

pub use compute_instance::ComputeInstanceType;

use log::debug;
use terrace_core::migrate::{ChainError, MigratorRegistry};
use terrace_core::provider::ResourceType;

/// Google Cloud provider
#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleProvider;

impl GoogleProvider {
    pub const NAME: &'static str = "google";

    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /// All resource types handled by this provider
    pub fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![Box::new(ComputeInstanceType)]
    }

    /// Migrators for every resource type of this provider
    pub fn migrators(&self) -> Result<MigratorRegistry, ChainError> {
        let mut registry = MigratorRegistry::new();
        for resource_type in self.resource_types() {
            debug!("Registering migrator for {}", resource_type.name());
            registry.register_resource_type(resource_type.as_ref())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_core::flatmap::FlatMap;

    #[test]
    fn resource_types_are_namespaced() {
        for resource_type in GoogleProvider::new().resource_types() {
            assert!(resource_type.name().starts_with("google."));
            assert_eq!(resource_type.schema().resource_type, resource_type.name());
        }
    }

    #[test]
    fn migrators_cover_compute_instance() {
        let registry = GoogleProvider::new().migrators().unwrap();
        assert_eq!(registry.resource_types(), vec!["google.compute_instance"]);
        assert_eq!(registry.current_version("google.compute_instance"), Some(1));

        let legacy: FlatMap = [("metadata.#", "1"), ("metadata.0.foo", "bar")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let migrated = registry
            .migrate("google.compute_instance", 0, &legacy)
            .unwrap();
        assert_eq!(migrated.version, 1);
        assert_eq!(
            migrated.attributes.get("metadata.foo").map(String::as_str),
            Some("bar")
        );
    }
}
