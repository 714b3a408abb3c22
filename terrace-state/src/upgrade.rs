//! Bringing persisted resource state up to the current schema versions

use log::{debug, info};
use terrace_core::migrate::{MigratorRegistry, SchemaVersion};
use terrace_core::resource::ResourceId;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::state::StateFile;

/// A resource whose persisted state was rewritten
#[derive(Debug, Clone, PartialEq)]
pub struct MigratedResource {
    pub resource: ResourceId,
    pub from: SchemaVersion,
    pub to: SchemaVersion,
}

impl std::fmt::Display for MigratedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: v{} -> v{}", self.resource, self.from, self.to)
    }
}

/// Result of upgrading a state file
#[derive(Debug, Clone)]
pub struct Upgrade {
    /// The upgraded state; its serial is bumped only when something changed
    pub state: StateFile,
    /// Resources that were rewritten, in state order
    pub migrated: Vec<MigratedResource>,
}

impl Upgrade {
    pub fn is_noop(&self) -> bool {
        self.migrated.is_empty()
    }
}

/// Upgrade every resource in `state` to the current version of its type
///
/// Either every resource is upgraded or the first failure is returned and
/// nothing is produced.
pub fn upgrade_state(state: &StateFile, registry: &MigratorRegistry) -> BackendResult<Upgrade> {
    let mut upgraded = state.clone();
    let mut migrated = Vec::new();

    for resource in &mut upgraded.resources {
        let result = registry
            .migrate(
                &resource.resource_type,
                resource.schema_version,
                &resource.attributes,
            )
            .map_err(|source| BackendError::Migration {
                resource: resource.id().to_string(),
                source,
            })?;

        if result.version == resource.schema_version && result.attributes == resource.attributes {
            continue;
        }

        debug!(
            "Upgraded {} from v{} to v{}",
            resource.id(),
            resource.schema_version,
            result.version
        );
        migrated.push(MigratedResource {
            resource: resource.id(),
            from: resource.schema_version,
            to: result.version,
        });
        resource.schema_version = result.version;
        resource.attributes = result.attributes;
    }

    if !migrated.is_empty() {
        upgraded.increment_serial();
    }

    Ok(Upgrade {
        state: upgraded,
        migrated,
    })
}

/// Upgrade the state held by `backend` under a lock
///
/// Returns `None` when the backend holds no state yet. With `dry_run` the
/// upgrade is computed but not written. The lock is released on every path.
pub async fn upgrade_backend(
    backend: &dyn StateBackend,
    registry: &MigratorRegistry,
    dry_run: bool,
) -> BackendResult<Option<Upgrade>> {
    let lock = backend.acquire_lock("upgrade").await?;
    let result = upgrade_locked(backend, registry, dry_run).await;
    let released = backend.release_lock(&lock).await;

    let upgrade = result?;
    released?;
    Ok(upgrade)
}

async fn upgrade_locked(
    backend: &dyn StateBackend,
    registry: &MigratorRegistry,
    dry_run: bool,
) -> BackendResult<Option<Upgrade>> {
    let Some(state) = backend.read_state().await? else {
        debug!("No state to upgrade");
        return Ok(None);
    };

    let upgrade = upgrade_state(&state, registry)?;
    if upgrade.is_noop() {
        info!("State is already at current schema versions");
    } else if dry_run {
        info!(
            "Dry run: {} resource(s) would be upgraded",
            upgrade.migrated.len()
        );
    } else {
        backend.write_state(&upgrade.state).await?;
        info!(
            "Upgraded {} resource(s), state serial is now {}",
            upgrade.migrated.len(),
            upgrade.state.serial
        );
    }

    Ok(Some(upgrade))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::LocalBackend;
    use crate::state::ResourceState;
    use terrace_core::migrate::{FlattenListOfMaps, MigrateError, StateMigrator};

    fn registry() -> MigratorRegistry {
        let mut registry = MigratorRegistry::new();
        registry.register(
            "google.compute_instance",
            StateMigrator::new(1)
                .with_step(FlattenListOfMaps::new("metadata", 0))
                .unwrap(),
        );
        registry
    }

    fn legacy_instance(name: &str) -> ResourceState {
        ResourceState::new("google.compute_instance", name, "google")
            .with_attribute("name", name)
            .with_attribute("metadata.#", "1")
            .with_attribute("metadata.0.foo", "bar")
    }

    fn sample_state() -> StateFile {
        let mut state = StateFile::new();
        state.upsert_resource(legacy_instance("web"));
        state.upsert_resource(
            ResourceState::new("aws.cloudformation_stack", "app", "aws")
                .with_attribute("stack_name", "app"),
        );
        state
    }

    #[test]
    fn upgrades_legacy_resources() {
        let state = sample_state();
        let upgrade = upgrade_state(&state, &registry()).unwrap();

        assert_eq!(
            upgrade.migrated,
            vec![MigratedResource {
                resource: ResourceId::new("google.compute_instance", "web"),
                from: 0,
                to: 1,
            }]
        );
        assert_eq!(upgrade.state.serial, state.serial + 1);

        let web = upgrade
            .state
            .find_resource("google.compute_instance", "web")
            .unwrap();
        assert_eq!(web.schema_version, 1);
        assert_eq!(
            web.attributes.get("metadata.foo").map(String::as_str),
            Some("bar")
        );
        assert!(!web.attributes.contains_key("metadata.#"));

        // Unversioned resource types are left alone
        let app = upgrade
            .state
            .find_resource("aws.cloudformation_stack", "app")
            .unwrap();
        assert_eq!(app, state.find_resource("aws.cloudformation_stack", "app").unwrap());
    }

    #[test]
    fn current_state_is_noop() {
        let first = upgrade_state(&sample_state(), &registry()).unwrap();
        let second = upgrade_state(&first.state, &registry()).unwrap();

        assert!(second.is_noop());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn failure_reports_resource_and_upgrades_nothing() {
        let mut state = sample_state();
        state.upsert_resource(
            ResourceState::new("google.compute_instance", "db", "google")
                .with_attribute("metadata.0.a.b", "c"),
        );

        match upgrade_state(&state, &registry()) {
            Err(BackendError::Migration { resource, source }) => {
                assert_eq!(resource, "google.compute_instance.db");
                assert!(matches!(source, MigrateError::MalformedState(_)));
            }
            other => panic!("Expected Migration error, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_version_is_reported() {
        let mut state = StateFile::new();
        state.upsert_resource(legacy_instance("web").with_schema_version(7));

        match upgrade_state(&state, &registry()) {
            Err(BackendError::Migration { source, .. }) => {
                assert_eq!(source, MigrateError::UnsupportedVersion(7));
            }
            other => panic!("Expected Migration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upgrade_backend_writes_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("terrace.state.json"));
        backend.write_state(&sample_state()).await.unwrap();

        let upgrade = upgrade_backend(&backend, &registry(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upgrade.migrated.len(), 1);

        let stored = backend.read_state().await.unwrap().unwrap();
        assert_eq!(stored, upgrade.state);
        assert!(!backend.lock_path().exists());
    }

    #[tokio::test]
    async fn dry_run_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("terrace.state.json"));
        let original = sample_state();
        backend.write_state(&original).await.unwrap();

        let upgrade = upgrade_backend(&backend, &registry(), true)
            .await
            .unwrap()
            .unwrap();
        assert!(!upgrade.is_noop());
        assert_eq!(backend.read_state().await.unwrap().unwrap(), original);
        assert!(!backend.lock_path().exists());
    }

    #[tokio::test]
    async fn failed_upgrade_still_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("terrace.state.json"));
        let mut state = StateFile::new();
        state.upsert_resource(legacy_instance("web").with_schema_version(-1));
        backend.write_state(&state).await.unwrap();

        let result = upgrade_backend(&backend, &registry(), false).await;
        assert!(matches!(result, Err(BackendError::Migration { .. })));
        assert!(!backend.lock_path().exists());
        assert_eq!(backend.read_state().await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("terrace.state.json"));

        let result = upgrade_backend(&backend, &registry(), false).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn held_lock_blocks_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("terrace.state.json"));
        backend.write_state(&sample_state()).await.unwrap();
        let held = backend.acquire_lock("apply").await.unwrap();

        let result = upgrade_backend(&backend, &registry(), false).await;
        assert!(matches!(result, Err(BackendError::Locked(_))));
        backend.release_lock(&held).await.unwrap();
    }

    #[test]
    fn migrated_resource_display() {
        let migrated = MigratedResource {
            resource: ResourceId::new("google.compute_instance", "web"),
            from: 0,
            to: 1,
        };
        assert_eq!(migrated.to_string(), "google.compute_instance.web: v0 -> v1");
    }
}
