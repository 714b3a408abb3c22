//! Terrace AWS Cloud Control Provider
//!
//! AWS Cloud Control API Provider implementation.
//!
//! ## Module Structure
//!
//! - `resources` - Resource type definitions
//! - `provider` - AwsProvider implementation and property conversions
//! - `schemas` - Resource schemas and their Cloud Control type names
//! - `tags` - CloudFormation tag list helpers
//! - `template` - Template body digests

pub mod provider;
pub mod resources;
pub mod schemas;
pub mod tags;
pub mod template;

// Re-export main types
pub use provider::AwsProvider;
pub use tags::{Tag, diff_tags, tags_from_map, tags_to_map};

use terrace_core::migrate::{ChainError, MigratorRegistry};
use terrace_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use terrace_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

/// Migrators for every AWS resource type
pub fn migrators() -> Result<MigratorRegistry, ChainError> {
    let mut registry = MigratorRegistry::new();
    for resource_type in resource_types() {
        registry.register_resource_type(resource_type.as_ref())?;
    }
    Ok(registry)
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(id, &identifier, &from, to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
