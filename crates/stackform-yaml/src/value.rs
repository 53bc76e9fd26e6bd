//! The tagged document value tree.
//!
//! `DocValue` is the in-memory form of every parsed template and
//! configuration document. All recursive dispatch over document structure
//! happens by pattern matching on this type; `Clone` provides the explicit
//! deep copy used before resource cloning.

use crate::{Error, Result};
use indexmap::IndexMap;
use yaml_rust2::Yaml;
use yaml_rust2::yaml::Hash;

/// A JSON-like document value: scalar, sequence, or ordered mapping.
///
/// Scalars are represented by `yaml_rust2::Yaml` so that numeric and string
/// representations survive a YAML round trip unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Scalar(Yaml),
    Seq(Vec<DocValue>),
    Map(IndexMap<String, DocValue>),
}

impl DocValue {
    /// A null scalar.
    pub fn null() -> Self {
        DocValue::Scalar(Yaml::Null)
    }

    /// A string scalar.
    pub fn string(s: impl Into<String>) -> Self {
        DocValue::Scalar(Yaml::String(s.into()))
    }

    /// An integer scalar.
    pub fn int(i: i64) -> Self {
        DocValue::Scalar(Yaml::Integer(i))
    }

    /// A boolean scalar.
    pub fn bool(b: bool) -> Self {
        DocValue::Scalar(Yaml::Boolean(b))
    }

    /// An empty mapping.
    pub fn empty_map() -> Self {
        DocValue::Map(IndexMap::new())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, DocValue::Scalar(_))
    }

    pub fn is_seq(&self) -> bool {
        matches!(self, DocValue::Seq(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, DocValue::Map(_))
    }

    /// Borrow the string content of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::Scalar(Yaml::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, DocValue>> {
        match self {
            DocValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, DocValue>> {
        match self {
            DocValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[DocValue]> {
        match self {
            DocValue::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut Vec<DocValue>> {
        match self {
            DocValue::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Mapping lookup; `None` for non-mappings or missing keys.
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DocValue> {
        self.as_map_mut().and_then(|m| m.get_mut(key))
    }

    /// Render a scalar in its display form, as it would be interpolated
    /// into an expanded string. Null and non-scalar values have no display
    /// form.
    pub fn scalar_display(&self) -> Option<String> {
        match self {
            DocValue::Scalar(Yaml::String(s)) => Some(s.clone()),
            DocValue::Scalar(Yaml::Integer(i)) => Some(i.to_string()),
            DocValue::Scalar(Yaml::Real(r)) => Some(r.clone()),
            DocValue::Scalar(Yaml::Boolean(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Build a tree from a parsed `Yaml` document. Mapping keys must be
    /// scalars; they are converted to their string form.
    pub fn from_yaml(yaml: Yaml) -> Result<Self> {
        match yaml {
            Yaml::Array(items) => {
                let converted: Result<Vec<_>> =
                    items.into_iter().map(DocValue::from_yaml).collect();
                Ok(DocValue::Seq(converted?))
            }
            Yaml::Hash(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(yaml_key_string(&key)?, DocValue::from_yaml(value)?);
                }
                Ok(DocValue::Map(map))
            }
            other => Ok(DocValue::Scalar(other)),
        }
    }

    /// Convert back into a `Yaml` document for emission.
    pub fn to_yaml(&self) -> Yaml {
        match self {
            DocValue::Scalar(y) => y.clone(),
            DocValue::Seq(items) => Yaml::Array(items.iter().map(DocValue::to_yaml).collect()),
            DocValue::Map(entries) => {
                let mut hash = Hash::new();
                for (key, value) in entries {
                    hash.insert(Yaml::String(key.clone()), value.to_yaml());
                }
                Yaml::Hash(hash)
            }
        }
    }

    /// Build a tree from a JSON value.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => DocValue::Scalar(Yaml::Null),
            serde_json::Value::Bool(b) => DocValue::Scalar(Yaml::Boolean(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DocValue::Scalar(Yaml::Integer(i)),
                None => DocValue::Scalar(Yaml::Real(n.to_string())),
            },
            serde_json::Value::String(s) => DocValue::Scalar(Yaml::String(s)),
            serde_json::Value::Array(items) => {
                DocValue::Seq(items.into_iter().map(DocValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => DocValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, DocValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON value for emission.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DocValue::Scalar(Yaml::Null) => serde_json::Value::Null,
            DocValue::Scalar(Yaml::Boolean(b)) => serde_json::Value::Bool(*b),
            DocValue::Scalar(Yaml::Integer(i)) => serde_json::Value::Number((*i).into()),
            DocValue::Scalar(Yaml::Real(r)) => r
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(r.clone())),
            DocValue::Scalar(Yaml::String(s)) => serde_json::Value::String(s.clone()),
            // Alias and BadValue never survive loading; render as null.
            DocValue::Scalar(_) => serde_json::Value::Null,
            DocValue::Seq(items) => {
                serde_json::Value::Array(items.iter().map(DocValue::to_json).collect())
            }
            DocValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn yaml_key_string(key: &Yaml) -> Result<String> {
    match key {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(r) => Ok(r.clone()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        other => Err(Error::UnsupportedKey(format!("{other:?}"))),
    }
}
