//! Tag helpers for CloudFormation-style `[{"Key": .., "Value": ..}]` tag lists

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use terrace_core::resource::Value;

/// A single resource tag in CloudFormation format
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Build tags from a map attribute, sorted by key
///
/// Non-string values are skipped.
pub fn tags_from_map(map: &HashMap<String, Value>) -> Vec<Tag> {
    let mut tags: Vec<Tag> = map
        .iter()
        .filter_map(|(key, value)| value.as_str().map(|v| Tag::new(key.clone(), v)))
        .collect();
    tags.sort();
    tags
}

/// Turn a list of tags into a map attribute
pub fn tags_to_map(tags: &[Tag]) -> HashMap<String, Value> {
    tags.iter()
        .map(|t| (t.key.clone(), Value::String(t.value.clone())))
        .collect()
}

/// Tags to create and tags to remove to get from `old` to `new`
///
/// Everything in `new` is (re)created. A tag in `old` is removed when its key
/// is missing from `new` or carries a different value there.
pub fn diff_tags(old: &[Tag], new: &[Tag]) -> (Vec<Tag>, Vec<Tag>) {
    let create: HashMap<&str, &str> = new
        .iter()
        .map(|t| (t.key.as_str(), t.value.as_str()))
        .collect();

    let remove = old
        .iter()
        .filter(|t| create.get(t.key.as_str()) != Some(&t.value.as_str()))
        .cloned()
        .collect();

    let mut create: Vec<Tag> = create.into_iter().map(|(k, v)| Tag::new(k, v)).collect();
    create.sort();
    (create, remove)
}
