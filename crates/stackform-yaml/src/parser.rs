//! Parse and emit entry points for the document tree.

use crate::{DocValue, Result};
use yaml_rust2::{YamlEmitter, YamlLoader};

/// Parse a YAML document into a [`DocValue`] tree.
///
/// Parses a single document; callers feed pre-encoded text when the source
/// uses shorthand tags (see [`crate::encode`]). If the input contains
/// multiple documents, only the first is used.
pub fn parse_yaml(content: &str) -> Result<DocValue> {
    let docs = YamlLoader::load_from_str(content)?;
    let doc = docs.into_iter().next().ok_or(crate::Error::EmptyDocument)?;
    DocValue::from_yaml(doc)
}

/// Emit a [`DocValue`] tree as YAML text.
///
/// Multi-line strings are emitted as literal blocks so that user-data
/// scripts survive the round trip readably.
pub fn emit_yaml(value: &DocValue) -> Result<String> {
    let yaml = value.to_yaml();
    let mut out = String::new();
    let mut emitter = YamlEmitter::new(&mut out);
    emitter.multiline_strings(true);
    emitter.dump(&yaml)?;
    out.push('\n');
    Ok(out)
}

/// Parse a JSON document into a [`DocValue`] tree.
pub fn parse_json(content: &str) -> Result<DocValue> {
    let json: serde_json::Value = serde_json::from_str(content)?;
    Ok(DocValue::from_json(json))
}

/// Emit a [`DocValue`] tree as pretty-printed JSON.
pub fn emit_json(value: &DocValue) -> Result<String> {
    Ok(serde_json::to_string_pretty(&value.to_json())?)
}
