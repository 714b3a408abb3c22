//! Advisory lock record guarding a state file while it is rewritten

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a lock is honoured if its holder never releases it (15 minutes)
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

/// Contents of a lock file
///
/// Field names follow the `ID`/`Operation`/`Who` layout other state tooling
/// writes, so an operator can tell who holds a lock by reading the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    /// Command holding the lock (e.g., "upgrade")
    pub operation: String,
    /// `user@host`
    pub who: String,
    /// Release of terrace that took the lock
    pub version: String,
    /// State file the lock guards
    #[serde(default)]
    pub path: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        let created = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            path: String::new(),
            created,
            expires: created + Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }

    pub fn for_path(mut self, path: &Path) -> Self {
        self.path = path.display().to_string();
        self
    }

    /// Expire `secs` after creation instead of the default
    pub fn expiring_after(mut self, secs: i64) -> Self {
        self.expires = self.created + Duration::seconds(secs);
        self
    }

    /// An expired lock may be taken over without a force-unlock
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} by {}, terrace {}, since {})",
            self.id,
            self.operation,
            self.who,
            self.version,
            self.created.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

fn lock_owner() -> String {
    let user = ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| "unknown".to_string());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}@{}", user, host)
}
