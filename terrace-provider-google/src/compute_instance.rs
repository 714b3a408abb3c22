//! Compute Engine instance resource type

use terrace_core::migrate::{ChainError, FlattenListOfMaps, SchemaVersion, StateMigrator};
use terrace_core::provider::ResourceType;
use terrace_core::resource::Value;
use terrace_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub const RESOURCE_TYPE: &str = "google.compute_instance";

/// Current layout of persisted instance state
///
/// v0 stored `metadata` as a list of single-entry maps
/// (`metadata.#`, `metadata.N.key`); v1 stores it as a map (`metadata.key`).
pub const SCHEMA_VERSION: SchemaVersion = 1;

/// Returns the schema for Compute Engine instances
pub fn compute_instance_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_version(SCHEMA_VERSION)
        .with_description("A Compute Engine virtual machine instance")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Instance name, unique within the zone"),
        )
        .attribute(
            AttributeSchema::new("machine_type", AttributeType::String)
                .required()
                .with_description("Machine type (e.g., n1-standard-1)"),
        )
        .attribute(
            AttributeSchema::new("zone", AttributeType::String)
                .required()
                .with_description("Zone the instance runs in"),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("can_ip_forward", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Allow sending and receiving packets with foreign addresses"),
        )
        .attribute(
            AttributeSchema::new("tags", AttributeType::string_list())
                .with_description("Network tags"),
        )
        .attribute(
            AttributeSchema::new("metadata", AttributeType::string_map())
                .with_description("Instance metadata key/value pairs"),
        )
        .attribute(AttributeSchema::new("self_link", AttributeType::String).read_only())
}

/// Migrator for persisted instance state
pub fn compute_instance_migrator() -> Result<StateMigrator, ChainError> {
    StateMigrator::new(SCHEMA_VERSION).with_step(FlattenListOfMaps::new("metadata", 0))
}

pub struct ComputeInstanceType;

impl ResourceType for ComputeInstanceType {
    fn name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        compute_instance_schema()
    }

    fn migrator(&self) -> Result<StateMigrator, ChainError> {
        compute_instance_migrator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use terrace_core::flatmap::{self, FlatMap};
    use terrace_core::migrate::MigrateError;
    use terrace_core::schema::TypeError;

    fn flat(entries: &[(&str, &str)]) -> FlatMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn migrate(version: SchemaVersion, state: &FlatMap) -> Result<FlatMap, MigrateError> {
        compute_instance_migrator().unwrap().migrate(version, state)
    }

    #[test]
    fn valid_instance() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("web"));
        attrs.insert("machine_type".to_string(), Value::from("n1-standard-1"));
        attrs.insert("zone".to_string(), Value::from("us-central1-a"));
        attrs.insert("metadata".to_string(), Value::string_map([("foo", "bar")]));
        attrs.insert(
            "tags".to_string(),
            Value::List(vec![Value::from("http"), Value::from("https")]),
        );

        assert!(compute_instance_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn missing_zone_is_rejected() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("web"));
        attrs.insert("machine_type".to_string(), Value::from("n1-standard-1"));

        let errors = compute_instance_schema().validate(&attrs).unwrap_err();
        assert_eq!(
            errors,
            vec![TypeError::MissingRequired {
                name: "zone".to_string()
            }]
        );
    }

    #[test]
    fn self_link_cannot_be_declared() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("web"));
        attrs.insert("machine_type".to_string(), Value::from("n1-standard-1"));
        attrs.insert("zone".to_string(), Value::from("us-central1-a"));
        attrs.insert("self_link".to_string(), Value::from("https://example"));

        assert!(compute_instance_schema().validate(&attrs).is_err());
    }

    #[test]
    fn migrator_matches_schema_version() {
        let migrator = ComputeInstanceType.migrator().unwrap();
        assert_eq!(migrator.current_version(), ComputeInstanceType.schema().version);
        assert_eq!(migrator.oldest_version(), 0);
    }

    #[test]
    fn empty_state_is_returned_unchanged() {
        for version in [0, 1, 99] {
            assert_eq!(migrate(version, &FlatMap::new()).unwrap(), FlatMap::new());
        }
    }

    #[test]
    fn v0_metadata_list_becomes_map() {
        let legacy = flat(&[
            ("metadata.#", "2"),
            ("metadata.0.foo", "bar"),
            ("metadata.1.baz", "qux"),
        ]);

        assert_eq!(
            migrate(0, &legacy).unwrap(),
            flat(&[("metadata.baz", "qux"), ("metadata.foo", "bar")])
        );
    }

    #[test]
    fn v0_other_attributes_survive() {
        let legacy = flat(&[
            ("metadata.#", "1"),
            ("metadata.0.a", "x"),
            ("other_field", "y"),
        ]);

        assert_eq!(
            migrate(0, &legacy).unwrap(),
            flat(&[("metadata.a", "x"), ("other_field", "y")])
        );
    }

    #[test]
    fn v0_malformed_metadata_is_rejected() {
        let legacy = flat(&[("metadata.weird", "z")]);
        let before = legacy.clone();

        assert!(matches!(
            migrate(0, &legacy),
            Err(MigrateError::MalformedState(_))
        ));
        assert_eq!(legacy, before);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let state = flat(&[("name", "web")]);
        assert_eq!(
            migrate(99, &state),
            Err(MigrateError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn migrated_state_is_stable_and_decodes() {
        let legacy = flat(&[
            ("name", "web"),
            ("can_ip_forward", "true"),
            ("tags.#", "1"),
            ("tags.0", "http"),
            ("metadata.#", "1"),
            ("metadata.0.startup-script", "echo hi"),
        ]);

        let current = migrate(0, &legacy).unwrap();
        assert_eq!(migrate(SCHEMA_VERSION, &current).unwrap(), current);

        let decoded = flatmap::expand_all(&current, &compute_instance_schema()).unwrap();
        assert_eq!(
            decoded.get("metadata"),
            Some(&Value::string_map([("startup-script", "echo hi")]))
        );
        assert_eq!(decoded.get("can_ip_forward"), Some(&Value::Bool(true)));
        assert_eq!(
            decoded.get("tags"),
            Some(&Value::List(vec![Value::from("http")]))
        );
    }
}
