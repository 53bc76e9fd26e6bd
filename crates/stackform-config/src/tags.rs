//! The global tag table.
//!
//! Configured tags are applied to every taggable resource and to stack
//! API calls. Two projections exist: the key/value pair list for API
//! calls, and the `{Key, Value}` mapping sequence CloudFormation expects.

use indexmap::IndexMap;
use stackform_yaml::DocValue;

#[derive(Debug, Clone, Default)]
pub struct TagTable {
    tags: IndexMap<String, String>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configuration's `Tags` mapping. Non-scalar values
    /// are skipped.
    pub fn from_config(tags: Option<&DocValue>) -> Self {
        let mut table = Self::new();
        if let Some(map) = tags.and_then(DocValue::as_map) {
            for (key, value) in map {
                if let Some(display) = value.scalar_display() {
                    table.tags.insert(key.clone(), display);
                }
            }
        }
        table
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Merge tags from a document value: either a plain mapping or a
    /// CloudFormation-style sequence of `{Key, Value}` entries. Added tags
    /// override existing ones.
    pub fn add(&mut self, tags: &DocValue) {
        match tags {
            DocValue::Map(entries) => {
                for (key, value) in entries {
                    if let Some(display) = value.scalar_display() {
                        self.tags.insert(key.clone(), display);
                    }
                }
            }
            DocValue::Seq(items) => {
                for item in items {
                    let key = item.get("Key").and_then(|k| k.scalar_display());
                    let value = item.get("Value").and_then(|v| v.scalar_display());
                    if let (Some(key), Some(value)) = (key, value) {
                        self.tags.insert(key, value);
                    }
                }
            }
            DocValue::Scalar(_) => {}
        }
    }

    /// Key/value pairs for stack API calls.
    pub fn api_tags(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// CloudFormation template form: a sequence of `{Key, Value}` maps.
    pub fn cfn_tags(&self) -> DocValue {
        DocValue::Seq(
            self.tags
                .iter()
                .map(|(k, v)| {
                    let mut entry = IndexMap::new();
                    entry.insert("Key".to_string(), DocValue::string(k));
                    entry.insert("Value".to_string(), DocValue::string(v));
                    DocValue::Map(entry)
                })
                .collect(),
        )
    }
}
