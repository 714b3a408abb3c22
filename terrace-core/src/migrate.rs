//! Migrate - Upgrade persisted resource state between schema versions
//!
//! Every resource type persists its attributes as a [`FlatMap`] tagged with
//! the schema version that produced it. When a provider changes how an
//! attribute is encoded it bumps the version of its schema and registers a
//! [`MigrationStep`] from the previous version. A [`StateMigrator`] chains
//! the steps so that state written by any older release can be brought up
//! to the current layout before it is read.
//!
//! Steps never touch their input: on failure the caller still holds the
//! state exactly as it was read.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use log::{debug, info};

use crate::flatmap::{self, COUNT_KEY, FlatMap, FlatMapError};
use crate::provider::ResourceType;

/// Version of a persisted state layout
pub type SchemaVersion = i64;

/// Errors returned while migrating state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrateError {
    /// There is no path from this version to the current one
    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(SchemaVersion),

    /// The state does not match the layout of the version it claims
    #[error("malformed state: unexpected key {0}")]
    MalformedState(String),
}

impl From<FlatMapError> for MigrateError {
    fn from(e: FlatMapError) -> Self {
        MigrateError::MalformedState(e.key().to_string())
    }
}

/// Result type for migrations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors registering a step with a [`StateMigrator`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Migration step starts from negative version {0}")]
    NegativeVersion(SchemaVersion),

    #[error("Migration step must advance one version, got {from} -> {to}")]
    NonConsecutive {
        from: SchemaVersion,
        to: SchemaVersion,
    },

    #[error("Migration step targets version {to}, beyond current version {current}")]
    BeyondCurrent {
        to: SchemaVersion,
        current: SchemaVersion,
    },

    #[error("A migration step from version {0} is already registered")]
    Duplicate(SchemaVersion),
}

/// A single version-to-version transformation of persisted state
pub trait MigrationStep: Send + Sync {
    /// Version this step reads
    fn from_version(&self) -> SchemaVersion;

    /// Version this step produces
    fn to_version(&self) -> SchemaVersion {
        self.from_version() + 1
    }

    /// Human-readable description, used in logs
    fn description(&self) -> String;

    /// Produce the state at `to_version()` from a state at `from_version()`
    fn migrate(&self, state: &FlatMap) -> MigrateResult<FlatMap>;
}

/// Ordered chain of migration steps for one resource type
pub struct StateMigrator {
    current_version: SchemaVersion,
    steps: BTreeMap<SchemaVersion, Box<dyn MigrationStep>>,
    resource_type: Option<String>,
}

impl StateMigrator {
    /// Create a migrator that only accepts state at `current_version`
    pub fn new(current_version: SchemaVersion) -> Self {
        Self {
            current_version,
            steps: BTreeMap::new(),
            resource_type: None,
        }
    }

    /// Name the resource type this migrator serves, for logging
    pub fn for_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// Register a step
    pub fn with_step(mut self, step: impl MigrationStep + 'static) -> Result<Self, ChainError> {
        let from = step.from_version();
        let to = step.to_version();

        if from < 0 {
            return Err(ChainError::NegativeVersion(from));
        }
        if to != from + 1 {
            return Err(ChainError::NonConsecutive { from, to });
        }
        if to > self.current_version {
            return Err(ChainError::BeyondCurrent {
                to,
                current: self.current_version,
            });
        }
        if self.steps.contains_key(&from) {
            return Err(ChainError::Duplicate(from));
        }

        self.steps.insert(from, Box::new(step));
        Ok(self)
    }

    /// The version every migration ends at
    pub fn current_version(&self) -> SchemaVersion {
        self.current_version
    }

    /// Oldest version with an unbroken chain of steps up to the current one
    pub fn oldest_version(&self) -> SchemaVersion {
        let mut version = self.current_version;
        while version > 0 && self.steps.contains_key(&(version - 1)) {
            version -= 1;
        }
        version
    }

    /// Whether state at `version` can be brought to the current version
    pub fn supports(&self, version: SchemaVersion) -> bool {
        version >= self.oldest_version() && version <= self.current_version
    }

    /// Bring `state` from `version` to the current version
    ///
    /// Empty state is returned unchanged whatever its version, as there is
    /// nothing to rewrite. The input is never modified.
    pub fn migrate(&self, version: SchemaVersion, state: &FlatMap) -> MigrateResult<FlatMap> {
        if state.is_empty() {
            debug!("Empty state; nothing to migrate");
            return Ok(state.clone());
        }

        if !self.supports(version) {
            return Err(MigrateError::UnsupportedVersion(version));
        }

        let mut migrated = state.clone();
        let mut version = version;
        while version < self.current_version {
            let step = self
                .steps
                .get(&version)
                .ok_or(MigrateError::UnsupportedVersion(version))?;

            info!(
                "migrating {} state v{} → v{} ({})",
                self.resource_type.as_deref().unwrap_or("resource"),
                version,
                step.to_version(),
                step.description()
            );
            debug!("Attributes before migration: {:?}", migrated);
            migrated = step.migrate(&migrated)?;
            debug!("Attributes after migration: {:?}", migrated);

            version = step.to_version();
        }

        Ok(migrated)
    }
}

impl std::fmt::Debug for StateMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMigrator")
            .field("resource_type", &self.resource_type)
            .field("current_version", &self.current_version)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Rewrites a list of single-entry maps (`field.#`, `field.<n>.<key>`) into
/// one map (`field.<key>`)
#[derive(Debug, Clone)]
pub struct FlattenListOfMaps {
    field: String,
    from_version: SchemaVersion,
}

impl FlattenListOfMaps {
    pub fn new(field: impl Into<String>, from_version: SchemaVersion) -> Self {
        Self {
            field: field.into(),
            from_version,
        }
    }
}

impl MigrationStep for FlattenListOfMaps {
    fn from_version(&self) -> SchemaVersion {
        self.from_version
    }

    fn description(&self) -> String {
        format!("flatten list of maps '{}' into a single map", self.field)
    }

    fn migrate(&self, state: &FlatMap) -> MigrateResult<FlatMap> {
        let prefix = format!("{}.", self.field);
        let count_key = format!("{}{}", prefix, COUNT_KEY);

        // Every `field.*` key is checked before anything is rewritten
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();
        for (key, value) in flatmap::nested_keys(state, &prefix) {
            if key == count_key {
                continue;
            }
            // `<element>.<key>`; the element label is dropped, whatever it is
            let entry_key = match key[prefix.len()..].split_once('.') {
                Some((element, entry))
                    if !element.is_empty()
                        && !entry.is_empty()
                        && !entry.contains('.')
                        && entry != COUNT_KEY =>
                {
                    entry
                }
                _ => return Err(MigrateError::MalformedState(key.to_string())),
            };

            match merged.entry(entry_key) {
                Entry::Occupied(existing) if *existing.get() != value => {
                    return Err(MigrateError::MalformedState(format!(
                        "{}{}",
                        prefix, entry_key
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }

        let mut migrated = state.clone();
        flatmap::remove_field(&mut migrated, &self.field);
        for (entry_key, value) in merged {
            migrated.insert(format!("{}{}", prefix, entry_key), value.to_string());
        }
        Ok(migrated)
    }
}

/// State brought to the current version of its resource type
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub version: SchemaVersion,
    pub attributes: FlatMap,
}

/// Migrators for every known resource type
#[derive(Debug, Default)]
pub struct MigratorRegistry {
    migrators: HashMap<String, StateMigrator>,
}

impl MigratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the migrator for a resource type, replacing any previous one
    pub fn register(&mut self, resource_type: impl Into<String>, migrator: StateMigrator) {
        let resource_type = resource_type.into();
        let migrator = migrator.for_resource_type(resource_type.clone());
        self.migrators.insert(resource_type, migrator);
    }

    /// Register the migrator a resource type declares
    pub fn register_resource_type(
        &mut self,
        resource_type: &dyn ResourceType,
    ) -> Result<(), ChainError> {
        self.register(resource_type.name(), resource_type.migrator()?);
        Ok(())
    }

    pub fn get(&self, resource_type: &str) -> Option<&StateMigrator> {
        self.migrators.get(resource_type)
    }

    pub fn current_version(&self, resource_type: &str) -> Option<SchemaVersion> {
        self.get(resource_type).map(StateMigrator::current_version)
    }

    /// Registered resource types in a stable order
    pub fn resource_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.migrators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Bring state of `resource_type` from `version` to its current version
    ///
    /// Resource types without a registered migrator are not versioned and
    /// come back unchanged.
    pub fn migrate(
        &self,
        resource_type: &str,
        version: SchemaVersion,
        state: &FlatMap,
    ) -> MigrateResult<Migrated> {
        match self.get(resource_type) {
            Some(migrator) => Ok(Migrated {
                version: migrator.current_version(),
                attributes: migrator.migrate(version, state)?,
            }),
            None => {
                debug!(
                    "No migrator registered for {}; keeping state as is",
                    resource_type
                );
                Ok(Migrated {
                    version,
                    attributes: state.clone(),
                })
            }
        }
    }
}
