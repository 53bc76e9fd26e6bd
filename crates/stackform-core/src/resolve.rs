//! Structural resolution of a document tree.
//!
//! Walks every mapping key and sequence index, expanding string leaves in
//! place. A leaf that is a bare reference marker (`$name`, `$@param`,
//! `$%item:attr`) is replaced wholesale, possibly by a non-scalar value;
//! every other string goes through `${...}` expansion. The key or index
//! set is snapshotted before mutation so replacement and deletion never
//! perturb iteration.

use crate::{expand, Error, Result, RunContext};
use stackform_yaml::DocValue;
use yaml_rust2::Yaml;

/// A leaf expanding to exactly this string is removed from its parent.
pub const DELETE_MARKER: &str = "<DELETE>";

/// A leaf expanding to exactly this string marks a value the caller was
/// required to supply.
pub const REQUIRED_MARKER: &str = "<REQUIRED>";

enum LeafAction {
    Keep,
    Replace(DocValue),
    Delete,
}

/// Resolve every variable reference in `value`, mutating it in place.
pub fn resolve_tree(ctx: &RunContext, value: &mut DocValue) -> Result<()> {
    match value {
        DocValue::Map(_) | DocValue::Seq(_) => resolve_container(ctx, value),
        DocValue::Scalar(Yaml::String(text)) => {
            let text = text.clone();
            match resolve_string_leaf(ctx, &text, "<root>")? {
                LeafAction::Replace(new_value) => *value = new_value,
                // A root leaf has no parent to delete it from.
                LeafAction::Delete => *value = DocValue::null(),
                LeafAction::Keep => {}
            }
            Ok(())
        }
        DocValue::Scalar(_) => Ok(()),
    }
}

fn resolve_container(ctx: &RunContext, value: &mut DocValue) -> Result<()> {
    match value {
        DocValue::Map(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let Some(child) = map.get_mut(&key) else {
                    continue;
                };
                match child {
                    DocValue::Map(_) | DocValue::Seq(_) => resolve_container(ctx, child)?,
                    DocValue::Scalar(Yaml::String(text)) => {
                        let text = text.clone();
                        match resolve_string_leaf(ctx, &text, &key)? {
                            LeafAction::Replace(new_value) => {
                                map.insert(key.clone(), new_value);
                            }
                            LeafAction::Delete => {
                                map.shift_remove(&key);
                            }
                            LeafAction::Keep => {}
                        }
                    }
                    DocValue::Scalar(_) => {}
                }
            }
            Ok(())
        }
        DocValue::Seq(items) => {
            let mut index = 0;
            while index < items.len() {
                match &mut items[index] {
                    child @ (DocValue::Map(_) | DocValue::Seq(_)) => {
                        resolve_container(ctx, child)?;
                        index += 1;
                    }
                    DocValue::Scalar(Yaml::String(text)) => {
                        let text = text.clone();
                        match resolve_string_leaf(ctx, &text, &index.to_string())? {
                            LeafAction::Replace(new_value) => {
                                items[index] = new_value;
                                index += 1;
                            }
                            LeafAction::Delete => {
                                items.remove(index);
                            }
                            LeafAction::Keep => index += 1,
                        }
                    }
                    DocValue::Scalar(_) => index += 1,
                }
            }
            Ok(())
        }
        DocValue::Scalar(_) => Ok(()),
    }
}

/// Decide what becomes of one string leaf.
///
/// Whole-value markers start with a single `$` (not `$$`, which is an
/// escape, and not `${`, which is token syntax). They accept no default:
/// a miss is always fatal here, unlike the string-expansion form of the
/// same sigils.
fn resolve_string_leaf(ctx: &RunContext, text: &str, key: &str) -> Result<LeafAction> {
    let bytes = text.as_bytes();
    if bytes.first() == Some(&b'$')
        && bytes.len() > 1
        && bytes[1] != b'$'
        && bytes[1] != b'{'
    {
        return whole_value(ctx, &text[1..]);
    }

    let expanded = expand(ctx, text)?;
    if expanded == DELETE_MARKER {
        tracing::trace!(key, "Deleting key per DELETE marker");
        return Ok(LeafAction::Delete);
    }
    if expanded == REQUIRED_MARKER {
        return Err(Error::MissingRequiredValue {
            key: key.to_string(),
        });
    }
    if expanded != text {
        tracing::trace!(from = text, to = %expanded, "Expanded string");
        return Ok(LeafAction::Replace(DocValue::string(expanded)));
    }
    Ok(LeafAction::Keep)
}

fn whole_value(ctx: &RunContext, body: &str) -> Result<LeafAction> {
    match body.as_bytes()[0] {
        b'@' => {
            let name = &body[1..];
            match ctx.params.get(name) {
                Some(value) if !matches!(value, DocValue::Scalar(Yaml::Null)) => {
                    Ok(LeafAction::Replace(value.clone()))
                }
                _ => Err(Error::UndefinedParameter {
                    name: name.to_string(),
                }),
            }
        }
        b'%' => {
            let lookup = &body[1..];
            let Some((item, attr)) = lookup.split_once(':') else {
                return Err(Error::InvalidReference {
                    token: lookup.to_string(),
                });
            };
            let values = ctx.kv_query(item, attr)?;
            if values.is_empty() {
                return Err(Error::AmbiguousLookup {
                    item: item.to_string(),
                    attr: attr.to_string(),
                    count: 0,
                });
            }
            Ok(LeafAction::Replace(DocValue::Seq(
                values.into_iter().map(DocValue::string).collect(),
            )))
        }
        _ => match ctx.config.get(body) {
            Some(value) => Ok(LeafAction::Replace(value.clone())),
            None => Err(Error::UndefinedConfigVar {
                name: body.to_string(),
            }),
        },
    }
}
