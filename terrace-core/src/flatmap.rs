//! Flatmap - Flat dotted-key encoding of resource attributes
//!
//! Persisted state stores every attribute as a string under a dotted key.
//! Compound values are spread over several keys:
//!
//! - list: `field.#` holds the element count, `field.<index>` (or
//!   `field.<index>.<subkey>` for compound elements) holds each element
//! - map: `field.<key>` for every entry, no count key
//! - scalar: `field` holds the value itself
//!
//! The encoding is only a storage boundary. Code that needs to reason about
//! the shape of an attribute decodes it into a [`Value`] with [`expand`],
//! works on the structured value, and encodes the result again with
//! [`insert_field`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use crate::resource::Value;
use crate::schema::{AttributeType, ResourceSchema};

/// Flat key/value representation of a resource's persisted attributes
pub type FlatMap = BTreeMap<String, String>;

/// Key segment holding the element count of a list
pub const COUNT_KEY: &str = "#";

/// Error decoding a flat attribute set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlatMapError {
    #[error("Malformed key '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

impl FlatMapError {
    fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// The offending key
    pub fn key(&self) -> &str {
        match self {
            Self::Malformed { key, .. } => key,
        }
    }
}

/// Encode a set of named attributes
pub fn flatten(attributes: &HashMap<String, Value>) -> FlatMap {
    let mut flat = FlatMap::new();
    for (name, value) in attributes {
        insert_field(&mut flat, name, value);
    }
    flat
}

/// Encode one value under `field`
pub fn insert_field(flat: &mut FlatMap, field: &str, value: &Value) {
    match value {
        Value::String(s) => {
            flat.insert(field.to_string(), s.clone());
        }
        Value::Int(n) => {
            flat.insert(field.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            flat.insert(field.to_string(), b.to_string());
        }
        Value::List(items) => {
            flat.insert(format!("{}.{}", field, COUNT_KEY), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                insert_field(flat, &format!("{}.{}", field, i), item);
            }
        }
        Value::Map(entries) => {
            for (key, item) in entries {
                insert_field(flat, &format!("{}.{}", field, key), item);
            }
        }
    }
}

/// Remove every key nested under `field` (`field.*`)
///
/// A bare scalar key named `field` is left alone. Returns the removed entries.
pub fn remove_field(flat: &mut FlatMap, field: &str) -> FlatMap {
    let prefix = format!("{}.", field);
    let keys: Vec<String> = nested_keys(flat, &prefix)
        .map(|(key, _)| key.to_string())
        .collect();

    keys.into_iter()
        .filter_map(|key| flat.remove(&key).map(|value| (key, value)))
        .collect()
}

/// Decode `field` as a value of type `ty`
///
/// Returns `Ok(None)` if the state holds no key for the field.
pub fn expand(
    flat: &FlatMap,
    field: &str,
    ty: &AttributeType,
) -> Result<Option<Value>, FlatMapError> {
    match ty {
        AttributeType::String | AttributeType::Int | AttributeType::Bool => flat
            .get(field)
            .map(|raw| parse_scalar(field, raw, ty))
            .transpose(),
        AttributeType::List(inner) => expand_list(flat, field, inner),
        AttributeType::Map(inner) => expand_map(flat, field, inner),
    }
}

/// Decode every attribute declared by `schema`
pub fn expand_all(
    flat: &FlatMap,
    schema: &ResourceSchema,
) -> Result<HashMap<String, Value>, FlatMapError> {
    let mut attributes = HashMap::new();
    for name in schema.attribute_names() {
        let attr = &schema.attributes[name];
        if let Some(value) = expand(flat, name, &attr.attr_type)? {
            attributes.insert(name.to_string(), value);
        }
    }
    Ok(attributes)
}

fn expand_list(
    flat: &FlatMap,
    field: &str,
    inner: &AttributeType,
) -> Result<Option<Value>, FlatMapError> {
    let prefix = format!("{}.", field);
    let mut indices = BTreeSet::new();
    let mut seen = false;

    for (key, _) in nested_keys(flat, &prefix) {
        seen = true;
        let (head, rest) = split_segment(&key[prefix.len()..]);
        if head == COUNT_KEY {
            // The count is bookkeeping; elements are taken from the indices present
            if rest.is_some() {
                return Err(FlatMapError::malformed(key, "count key cannot have children"));
            }
            continue;
        }
        let index: usize = head.parse().map_err(|_| {
            FlatMapError::malformed(key, "list index must be a non-negative integer")
        })?;
        check_element_shape(key, rest, inner)?;
        indices.insert(index);
    }

    if !seen {
        return Ok(None);
    }

    let mut items = Vec::with_capacity(indices.len());
    for index in indices {
        if let Some(item) = expand(flat, &format!("{}.{}", field, index), inner)? {
            items.push(item);
        }
    }
    Ok(Some(Value::List(items)))
}

fn expand_map(
    flat: &FlatMap,
    field: &str,
    inner: &AttributeType,
) -> Result<Option<Value>, FlatMapError> {
    let prefix = format!("{}.", field);
    let mut entry_keys = BTreeSet::new();
    let mut seen = false;

    for (key, _) in nested_keys(flat, &prefix) {
        seen = true;
        let suffix = &key[prefix.len()..];
        if suffix == COUNT_KEY {
            // Only lists carry a count; here `#` would be data with no place to go
            return Err(FlatMapError::malformed(key, "count key inside a map"));
        }
        let (head, rest) = if inner.is_scalar() {
            (suffix, None)
        } else {
            split_segment(suffix)
        };
        if head.is_empty() {
            return Err(FlatMapError::malformed(key, "empty map key"));
        }
        if inner.is_scalar() && suffix.contains('.') {
            return Err(FlatMapError::malformed(
                key,
                "map of scalars cannot hold nested keys",
            ));
        }
        check_element_shape(key, rest, inner)?;
        entry_keys.insert(head);
    }

    if !seen {
        return Ok(None);
    }

    let mut entries = HashMap::new();
    for entry_key in entry_keys {
        if let Some(item) = expand(flat, &format!("{}.{}", field, entry_key), inner)? {
            entries.insert(entry_key.to_string(), item);
        }
    }
    Ok(Some(Value::Map(entries)))
}

/// Scalars live at the element key itself, compound elements below it
fn check_element_shape(
    key: &str,
    rest: Option<&str>,
    inner: &AttributeType,
) -> Result<(), FlatMapError> {
    match (inner.is_scalar(), rest) {
        (true, None) => Ok(()),
        (true, Some(_)) => Err(FlatMapError::malformed(
            key,
            format!("{} element cannot hold nested keys", inner),
        )),
        (false, Some(rest)) if !rest.is_empty() => Ok(()),
        (false, _) => Err(FlatMapError::malformed(
            key,
            format!("{} element must be encoded below its index", inner),
        )),
    }
}

fn parse_scalar(key: &str, raw: &str, ty: &AttributeType) -> Result<Value, FlatMapError> {
    match ty {
        AttributeType::Int => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| FlatMapError::malformed(key, format!("'{}' is not an integer", raw))),
        AttributeType::Bool => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(FlatMapError::malformed(
                key,
                format!("'{}' is not a boolean", raw),
            )),
        },
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Entries whose key starts with `prefix`, in key order
pub fn nested_keys<'a>(
    flat: &'a FlatMap,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    flat.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.as_str(), value.as_str()))
}

fn split_segment(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(entries: &[(&str, &str)]) -> FlatMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn list_of_maps() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::string_map()))
    }

    #[test]
    fn flatten_encodes_every_shape() {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::from("web"));
        attributes.insert("size".to_string(), Value::Int(10));
        attributes.insert("enabled".to_string(), Value::Bool(false));
        attributes.insert(
            "tags".to_string(),
            Value::List(vec![Value::from("a"), Value::from("b")]),
        );
        attributes.insert(
            "metadata".to_string(),
            Value::string_map([("foo", "bar")]),
        );

        assert_eq!(
            flatten(&attributes),
            flat(&[
                ("enabled", "false"),
                ("metadata.foo", "bar"),
                ("name", "web"),
                ("size", "10"),
                ("tags.#", "2"),
                ("tags.0", "a"),
                ("tags.1", "b"),
            ])
        );
    }

    #[test]
    fn expand_list_of_maps() {
        let state = flat(&[
            ("metadata.#", "2"),
            ("metadata.0.foo", "bar"),
            ("metadata.1.baz", "qux"),
        ]);

        let value = expand(&state, "metadata", &list_of_maps()).unwrap();
        assert_eq!(
            value,
            Some(Value::List(vec![
                Value::string_map([("foo", "bar")]),
                Value::string_map([("baz", "qux")]),
            ]))
        );
    }

    #[test]
    fn expand_list_orders_indices_numerically() {
        let mut state = FlatMap::new();
        for i in 0..12 {
            state.insert(format!("tags.{}", i), format!("t{}", i));
        }

        let Some(Value::List(items)) =
            expand(&state, "tags", &AttributeType::string_list()).unwrap()
        else {
            panic!("Expected list");
        };
        assert_eq!(items.len(), 12);
        assert_eq!(items[2], Value::from("t2"));
        assert_eq!(items[11], Value::from("t11"));
    }

    #[test]
    fn expand_absent_field_is_none() {
        let state = flat(&[("name", "web")]);
        assert_eq!(expand(&state, "metadata", &list_of_maps()).unwrap(), None);
        assert_eq!(
            expand(&state, "zone", &AttributeType::String).unwrap(),
            None
        );
    }

    #[test]
    fn expand_list_with_only_count_is_empty() {
        let state = flat(&[("metadata.#", "0")]);
        assert_eq!(
            expand(&state, "metadata", &list_of_maps()).unwrap(),
            Some(Value::List(vec![]))
        );
    }

    #[test]
    fn expand_rejects_non_numeric_index() {
        let state = flat(&[("metadata.#", "1"), ("metadata.weird", "x")]);
        let err = expand(&state, "metadata", &list_of_maps()).unwrap_err();
        assert_eq!(err.key(), "metadata.weird");
    }

    #[test]
    fn expand_rejects_scalar_where_map_element_expected() {
        let state = flat(&[("metadata.0", "x")]);
        let err = expand(&state, "metadata", &list_of_maps()).unwrap_err();
        assert_eq!(err.key(), "metadata.0");
    }

    #[test]
    fn expand_rejects_dotted_key_in_map_of_strings() {
        let state = flat(&[("metadata.0.a.b", "x")]);
        let err = expand(&state, "metadata", &list_of_maps()).unwrap_err();
        assert_eq!(err.key(), "metadata.0.a.b");
    }

    #[test]
    fn expand_rejects_count_key_inside_list_element() {
        let state = flat(&[
            ("metadata.#", "1"),
            ("metadata.0.#", "keepme"),
            ("metadata.0.a", "x"),
        ]);
        let err = expand(&state, "metadata", &list_of_maps()).unwrap_err();
        assert_eq!(err.key(), "metadata.0.#");
    }

    #[test]
    fn expand_rejects_bad_scalars() {
        let state = flat(&[("size", "ten"), ("enabled", "yes")]);
        assert!(expand(&state, "size", &AttributeType::Int).is_err());
        assert!(expand(&state, "enabled", &AttributeType::Bool).is_err());
    }

    #[test]
    fn expand_ignores_keys_sharing_a_name_prefix() {
        let state = flat(&[("metadata", "plain"), ("metadata_startup", "x")]);
        assert_eq!(expand(&state, "metadata", &list_of_maps()).unwrap(), None);
    }

    #[test]
    fn remove_field_keeps_unrelated_keys() {
        let mut state = flat(&[
            ("metadata", "plain"),
            ("metadata.#", "1"),
            ("metadata.0.a", "x"),
            ("metadata_startup", "y"),
        ]);

        let removed = remove_field(&mut state, "metadata");
        assert_eq!(removed.len(), 2);
        assert_eq!(
            state,
            flat(&[("metadata", "plain"), ("metadata_startup", "y")])
        );
    }

    #[test]
    fn expand_all_uses_schema_types() {
        use crate::schema::AttributeSchema;

        let schema = ResourceSchema::new("thing")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("size", AttributeType::Int))
            .attribute(AttributeSchema::new("metadata", AttributeType::string_map()));
        let state = flat(&[
            ("name", "web"),
            ("size", "3"),
            ("metadata.foo", "bar"),
            ("unknown", "ignored"),
        ]);

        let attributes = expand_all(&state, &schema).unwrap();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes["size"], Value::Int(3));
        assert_eq!(attributes["metadata"], Value::string_map([("foo", "bar")]));
        assert_eq!(flatten(&attributes).len(), 3);
    }
}
