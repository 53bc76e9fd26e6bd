//! Candidate-directory file discovery.
//!
//! Callers hand over an ordered list of directories (least to most
//! specific) and a relative filename. Template files want the first match;
//! layered configuration wants every match merged, later directories
//! overriding earlier ones.

use crate::{merge, Error, Result};
use stackform_yaml::{parse_yaml, DocValue};
use std::path::{Path, PathBuf};

/// Return the first existing candidate path, or `None`.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    for candidate in candidates {
        tracing::debug!(path = %candidate.display(), "Looking for template");
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "Found");
            return Some(candidate.clone());
        }
    }
    None
}

/// Parse and merge every `dir/relative` that exists, in directory order.
///
/// Returns `None` when no directory holds the file.
pub fn merge_all(dirs: &[PathBuf], relative: &str) -> Result<Option<DocValue>> {
    let mut merged: Option<DocValue> = None;
    for dir in dirs {
        let path = dir.join(relative);
        tracing::debug!(path = %path.display(), "Looking for {relative}");
        if !path.is_file() {
            continue;
        }
        tracing::info!(path = %path.display(), "Loading {relative}");
        let layer = read_yaml(&path)?;
        match merged.as_mut() {
            Some(tree) => merge(tree, layer),
            None => merged = Some(layer),
        }
    }
    Ok(merged)
}

fn read_yaml(path: &Path) -> Result<DocValue> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_yaml(&raw).map_err(|source| Error::Document {
        path: path.display().to_string(),
        source,
    })
}
