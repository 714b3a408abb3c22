//! Terrace State Management
//!
//! This crate persists the last observed state of managed resources and
//! keeps it readable across provider schema changes.
//!
//! # Overview
//!
//! - **StateFile**: The main state structure containing all managed resources
//! - **ResourceState**: Flat-encoded attributes of one resource plus the schema version that wrote them
//! - **StateBackend**: A trait for state storage backends
//! - **LockInfo**: Information about state locks for concurrent access control
//! - **upgrade_state / upgrade_backend**: Migrate every resource to its current schema version
//!
//! # Example
//!
//! ```ignore
//! use terrace_state::{create_backend, upgrade_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("terrace.state.json"))?;
//!
//! // Locks, reads, upgrades, writes and unlocks
//! if let Some(upgrade) = upgrade_backend(backend.as_ref(), &registry, false).await? {
//!     for migrated in &upgrade.migrated {
//!         println!("{}", migrated);
//!     }
//! }
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;
pub mod upgrade;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
pub use upgrade::{MigratedResource, Upgrade, upgrade_backend, upgrade_state};
