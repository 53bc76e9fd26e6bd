//! The run's named parameter store.

use indexmap::IndexMap;
use stackform_yaml::DocValue;

/// Named parameters for one run, set by the caller and read throughout
/// resolution.
///
/// Values are full document values: expansion interpolates scalars, while
/// whole-value substitution may splice mappings or sequences into a
/// template.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: IndexMap<String, DocValue>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&DocValue> {
        self.params.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: DocValue) {
        self.params.insert(name.into(), value);
    }

    /// Convenience for the common string case.
    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, DocValue::string(value));
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocValue)> {
        self.params.iter()
    }
}
