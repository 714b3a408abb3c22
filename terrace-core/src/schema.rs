//! Schema - Define type schemas for resources
//!
//! Providers define a schema for each resource type. Besides attribute
//! types, a schema carries the version of the persisted state layout it
//! produces, which is what state migration upgrades older state towards.

use std::collections::HashMap;
use std::fmt;

use crate::migrate::SchemaVersion;
use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// List
    List(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// List of strings
    pub fn string_list() -> Self {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// Map of strings
    pub fn string_map() -> Self {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    /// Whether values of this type are encoded under a single key
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            AttributeType::String | AttributeType::Int | AttributeType::Bool
        )
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name().to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is read-only")]
    ReadOnly { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider only; operators cannot declare it
    pub read_only: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Provider-side property name (e.g., "StackName" for AWS Cloud Control)
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            read_only: false,
            default: None,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    /// Version of the persisted state layout for this resource type
    pub version: SchemaVersion,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            version: 0,
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Attribute names in a stable order
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate desired resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            let Some(schema) = self.attributes.get(name) else {
                // Unknown attributes are allowed
                continue;
            };
            if schema.read_only {
                errors.push(TypeError::ReadOnly { name: name.clone() });
            } else if let Err(e) = schema.attr_type.validate(value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_nested_map_reports_key() {
        let t = AttributeType::string_map();
        let mut map = HashMap::new();
        map.insert("ok".to_string(), Value::String("x".to_string()));
        map.insert("bad".to_string(), Value::Int(1));

        let err = t.validate(&Value::Map(map)).unwrap_err();
        match err {
            TypeError::MapValueError { key, .. } => assert_eq!(key, "bad"),
            other => panic!("Expected MapValueError, got {:?}", other),
        }
    }

    #[test]
    fn validate_list_reports_index() {
        let t = AttributeType::string_list();
        let value = Value::List(vec![Value::String("a".to_string()), Value::Bool(true)]);
        let err = t.validate(&value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "List item at index 1: Type mismatch: expected String, got Bool"
        );
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", AttributeType::Int))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("stack")
            .attribute(AttributeSchema::new("stack_name", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert_eq!(
            result.unwrap_err(),
            vec![TypeError::MissingRequired {
                name: "stack_name".to_string()
            }]
        );
    }

    #[test]
    fn read_only_attribute_is_rejected() {
        let schema = ResourceSchema::new("stack")
            .attribute(AttributeSchema::new("stack_id", AttributeType::String).read_only());

        let mut attrs = HashMap::new();
        attrs.insert("stack_id".to_string(), Value::String("arn".to_string()));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn schema_version_defaults_to_zero() {
        let schema = ResourceSchema::new("thing");
        assert_eq!(schema.version, 0);
        assert_eq!(schema.with_version(3).version, 3);
    }

    #[test]
    fn attribute_names_are_sorted() {
        let schema = ResourceSchema::new("thing")
            .attribute(AttributeSchema::new("zone", AttributeType::String))
            .attribute(AttributeSchema::new("name", AttributeType::String));
        assert_eq!(schema.attribute_names(), vec!["name", "zone"]);
    }
}
