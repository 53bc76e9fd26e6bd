//! The merged configuration tree.

use stackform_yaml::DocValue;
use yaml_rust2::Yaml;

/// Recursively merge `src` into `dst`.
///
/// Merging recurses only where both sides hold a mapping at the same key;
/// every other kind of value is replaced wholesale by `src`. Sequences do
/// not concatenate.
pub fn merge(dst: &mut DocValue, src: DocValue) {
    match (dst, src) {
        (DocValue::Map(dst_map), DocValue::Map(src_map)) => {
            for (key, src_value) in src_map {
                match dst_map.get_mut(&key) {
                    Some(dst_value) if dst_value.is_map() && src_value.is_map() => {
                        merge(dst_value, src_value);
                    }
                    _ => {
                        dst_map.insert(key, src_value);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Configuration assembled from layered sources, later layers overriding
/// earlier ones at matching mapping keys.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    root: DocValue,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            root: DocValue::empty_map(),
        }
    }
}

impl ConfigDocument {
    /// Wrap an already-merged tree. Non-mapping roots are accepted but
    /// every lookup on them misses.
    pub fn new(root: DocValue) -> Self {
        Self { root }
    }

    /// Merge the given layers in order, first layer lowest priority.
    pub fn from_layers(layers: impl IntoIterator<Item = DocValue>) -> Self {
        let mut root = DocValue::empty_map();
        for layer in layers {
            merge(&mut root, layer);
        }
        Self { root }
    }

    /// Look up a top-level configuration variable. A null entry is
    /// indistinguishable from an absent one.
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        match self.root.get(key) {
            Some(DocValue::Scalar(Yaml::Null)) => None,
            other => other,
        }
    }

    pub fn root(&self) -> &DocValue {
        &self.root
    }
}
