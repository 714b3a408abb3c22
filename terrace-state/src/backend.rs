//! Where state files live and what can go wrong reaching them

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use terrace_core::migrate::MigrateError;
use terrace_core::resource::Value;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Someone else is reading or rewriting the state
    #[error("State is locked: {0}")]
    Locked(Box<LockInfo>),

    #[error("No lock with ID {0} is held")]
    LockNotFound(String),

    #[error("Lock {actual} is held, not {expected}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state or lock file exists but does not parse
    #[error("Invalid {what} at {}: {source}", .path.display())]
    Corrupt {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A resource's persisted state could not be brought to its current schema
    #[error("Failed to migrate state of {resource}: {source}")]
    Migration {
        resource: String,
        #[source]
        source: MigrateError,
    },
}

impl BackendError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Durable home of one state file and its lock
///
/// The upgrade driver only relies on these operations, so a backend never
/// needs to understand resource attributes or schema versions.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `None` until the first state has been written
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Replace the stored state; readers see either the old file or the new one
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Fails with [`BackendError::Locked`] while an unexpired lock is held
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock this process acquired
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove a lock left behind by a process that died, given its ID
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// Backend selection plus backend-specific settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// `local` is the only type so far
    pub backend_type: String,
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    /// The local file backend storing state at `path`
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend_type: "local".to_string(),
            attributes: HashMap::from([("path".to_string(), Value::String(path.into()))]),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key) {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_names_the_holder() {
        let lock = LockInfo::new("upgrade");
        let error = BackendError::Locked(Box::new(lock.clone()));
        let shown = error.to_string();
        assert!(shown.starts_with("State is locked: "));
        assert!(shown.contains(&lock.id));
        assert!(shown.contains(&lock.who));
    }

    #[test]
    fn migration_error_names_the_resource() {
        let error = BackendError::Migration {
            resource: "google.compute_instance.web".to_string(),
            source: MigrateError::UnsupportedVersion(99),
        };
        assert_eq!(
            error.to_string(),
            "Failed to migrate state of google.compute_instance.web: unsupported schema version: 99"
        );
    }

    #[test]
    fn io_error_names_the_path() {
        let error = BackendError::io(
            "read state file",
            "prod/terrace.state.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            error.to_string(),
            "Failed to read state file prod/terrace.state.json: denied"
        );
    }

    #[test]
    fn config_attributes() {
        let config =
            BackendConfig::local("state.json").with_attribute("lock_timeout", Value::Int(60));

        assert_eq!(config.backend_type, "local");
        assert_eq!(config.get_string("path"), Some("state.json"));
        assert_eq!(config.get_int("lock_timeout"), Some(60));
        assert_eq!(config.get_string("lock_timeout"), None);
        assert_eq!(config.get_int("missing"), None);
    }
}
