//! Terrace Core
//!
//! Resource model, flat state encoding and schema-versioned state migration
//! shared by Terrace providers and state backends

pub mod flatmap;
pub mod migrate;
pub mod provider;
pub mod resource;
pub mod schema;
