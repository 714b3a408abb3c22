//! Provider - Resource types and the vendor operations behind them
//!
//! A [`ResourceType`] owns the persisted layout of one kind of resource: its
//! attribute schema and the [`StateMigrator`] that brings older state up to
//! that schema. A [`Provider`] groups the resource types of one vendor and
//! performs the remote calls that read and change them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::migrate::{ChainError, MigratorRegistry, StateMigrator};
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Failure of a provider operation
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// A vendor API call could not be made or was rejected
    #[error("{action} failed: {message}")]
    Request {
        action: &'static str,
        message: String,
    },

    /// The vendor accepted the request but the operation ended badly
    #[error("Operation {status}: {message}")]
    Operation { status: String, message: String },

    #[error("Operation did not finish within {0:?}")]
    Timeout(Duration),

    /// The vendor answered with something that cannot be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("[{resource}] {source}")]
    Resource {
        resource: ResourceId,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Wrap a vendor SDK error raised while performing `action`
    pub fn request(action: &'static str, error: impl std::fmt::Debug) -> Self {
        Self::Request {
            action,
            message: format!("{:?}", error),
        }
    }

    /// Attach the resource the failed operation was working on
    pub fn for_resource(self, resource: ResourceId) -> Self {
        match self {
            // Keep the innermost resource
            Self::Resource { .. } => self,
            other => Self::Resource {
                resource,
                source: Box::new(other),
            },
        }
    }

    /// The resource this error is about, if known
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Self::Resource { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One kind of resource and the persisted layout of its state
pub trait ResourceType: Send + Sync {
    /// Namespaced name (e.g., "google.compute_instance")
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Migrator bringing persisted state of this type to `schema().version`
    ///
    /// Types that never changed their layout keep the default, which only
    /// accepts state at the current version.
    fn migrator(&self) -> Result<StateMigrator, ChainError> {
        Ok(StateMigrator::new(self.schema().version))
    }
}

/// Vendor operations over the resource types a provider declares
///
/// `read`, `update` and `delete` address the remote object by the
/// identifier the vendor returned from `create`.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Migrators for every resource type of this provider
    fn migrators(&self) -> Result<MigratorRegistry, ChainError> {
        let mut registry = MigratorRegistry::new();
        for resource_type in self.resource_types() {
            registry.register_resource_type(resource_type.as_ref())?;
        }
        Ok(registry)
    }

    /// Observed state, or `State::not_found()` when the object is gone or
    /// no identifier is known yet
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Returns the observed state with its identifier set
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Move a resource from its observed state to the desired one
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}
