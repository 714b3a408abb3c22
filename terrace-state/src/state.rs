//! State file structures for persisting infrastructure state

use serde::{Deserialize, Serialize};
use terrace_core::flatmap::{self, FlatMap, FlatMapError};
use terrace_core::migrate::SchemaVersion;
use terrace_core::resource::{ResourceId, State};
use terrace_core::schema::ResourceSchema;

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of Terrace that last modified this state
    pub terrace_version: String,
    /// All managed resources and their last observed state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Create a new state file with a specific lineage (for initialization)
    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            terrace_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and update terrace version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.terrace_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Find a resource mutably by type and name
    pub fn find_resource_mut(
        &mut self,
        resource_type: &str,
        name: &str,
    ) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted state of a single managed resource
///
/// Attributes are kept in their flat encoding together with the schema
/// version that wrote them, so they can be migrated before being decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "google.compute_instance")
    pub resource_type: String,
    /// Resource name
    pub name: String,
    /// Provider name (e.g., "google")
    pub provider: String,
    /// Provider-side identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Schema version of `attributes`; state written before versioning is v0
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Flat-encoded attributes
    #[serde(default)]
    pub attributes: FlatMap,
}

impl ResourceState {
    /// Create a new resource state
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            schema_version: 0,
            attributes: FlatMap::new(),
        }
    }

    /// Record observed state, encoded at the schema's current version
    pub fn from_state(provider: impl Into<String>, state: &State, schema: &ResourceSchema) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            schema_version: schema.version,
            attributes: flatmap::flatten(&state.attributes),
        }
    }

    /// Decode the persisted attributes into observed state
    ///
    /// The attributes must already be at `schema.version`.
    pub fn to_state(&self, schema: &ResourceSchema) -> Result<State, FlatMapError> {
        let attributes = flatmap::expand_all(&self.attributes, schema)?;
        let state = State::existing(self.id(), attributes);
        Ok(match &self.identifier {
            Some(identifier) => state.with_identifier(identifier.clone()),
            None => state,
        })
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.resource_type.clone(), self.name.clone())
    }

    /// Set a flat attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }
}
