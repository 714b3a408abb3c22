//! State kept in a JSON file on local disk
//!
//! The lock lives next to the state file (`terrace.state.lock` for
//! `terrace.state.json`) and is only advisory: it keeps two terrace processes
//! from rewriting the same file at once.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::{DEFAULT_LOCK_TIMEOUT_SECS, LockInfo};
use crate::state::StateFile;

/// Local file backend for development and simple use cases
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Path to the state file
    state_path: PathBuf,
    /// Path to the lock file
    lock_path: PathBuf,
    /// Lifetime of acquired locks
    lock_timeout_secs: i64,
}

impl LocalBackend {
    /// Default state file name
    pub const DEFAULT_STATE_FILE: &'static str = "terrace.state.json";

    /// Create a new LocalBackend with default paths (terrace.state.json in current directory)
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    /// Create a new LocalBackend with a specific state file path
    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }

    /// Create a LocalBackend from configuration
    ///
    /// Recognised attributes: `path` (string), `lock_timeout` (seconds)
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config
            .get_string("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_FILE));

        let mut backend = Self::with_path(path);
        if let Some(timeout) = config.get_int("lock_timeout") {
            if timeout <= 0 {
                return Err(BackendError::Configuration(format!(
                    "lock_timeout must be positive, got {}",
                    timeout
                )));
            }
            backend.lock_timeout_secs = timeout;
        }
        Ok(backend)
    }

    /// Get the state file path
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Get the lock file path
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .map_err(|e| BackendError::io("read lock file", &self.lock_path, e))?;

        let lock = serde_json::from_str(&content).map_err(|source| BackendError::Corrupt {
            what: "lock file",
            path: self.lock_path.clone(),
            source,
        })?;

        Ok(Some(lock))
    }

    fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .map_err(|e| BackendError::io("remove lock file", &self.lock_path, e))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `content` to a sibling temporary file, sync it and rename it over `path`
fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);
    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path)
            .map_err(|e| BackendError::io("read state file", &self.state_path, e))?;

        let state: StateFile =
            serde_json::from_str(&content).map_err(|source| BackendError::Corrupt {
                what: "state file",
                path: self.state_path.clone(),
                source,
            })?;

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let content =
            serde_json::to_string_pretty(state).map_err(|source| BackendError::Encode {
                what: "state",
                source,
            })?;

        write_atomically(&self.state_path, content.as_bytes())
            .map_err(|e| BackendError::io("write state file", &self.state_path, e))?;

        debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        // An unreadable lock file still counts as held
        match self.read_lock() {
            Ok(Some(existing)) if !existing.is_expired() => {
                return Err(BackendError::Locked(Box::new(existing)));
            }
            Ok(Some(existing)) => {
                debug!("Taking over expired lock {}", existing.id);
            }
            Ok(None) => {}
            Err(e) => return Err(e),
        }

        let lock = LockInfo::new(operation)
            .for_path(&self.state_path)
            .expiring_after(self.lock_timeout_secs);
        let content = serde_json::to_string_pretty(&lock).map_err(|source| BackendError::Encode {
            what: "lock",
            source,
        })?;

        write_atomically(&self.lock_path, content.as_bytes())
            .map_err(|e| BackendError::io("write lock file", &self.lock_path, e))?;

        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock()
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        if !self.lock_path.exists() {
            return Err(BackendError::LockNotFound(lock_id.to_string()));
        }

        // A corrupt lock file can always be forced away
        if let Ok(Some(existing)) = self.read_lock()
            && existing.id != lock_id
        {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        self.remove_lock()
    }
}
