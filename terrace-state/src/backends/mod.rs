//! Backend implementations for state storage

mod local;

pub use local::LocalBackend;

use log::debug;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};

/// Open the backend named by `config.backend_type`
pub fn create_backend(config: &BackendConfig) -> BackendResult<Box<dyn StateBackend>> {
    match config.backend_type.as_str() {
        "local" => {
            let backend = LocalBackend::from_config(config)?;
            debug!("Using local state at {}", backend.state_path().display());
            Ok(Box::new(backend))
        }
        other => Err(BackendError::UnsupportedBackend(other.to_string())),
    }
}
