//! Build environment and `${VAR}` expansion.
//!
//! `EnvVars` is both the environment the tool inherits and the context used
//! to resolve `${NAME}` / `$NAME` references in free-text fields. Unknown
//! names are left untouched.

use std::collections::BTreeMap;

/// The environment of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Expand variable references in `input`.
    pub fn expand(&self, input: &str) -> String {
        shellexpand::env_with_context_no_errors(input, |name: &str| self.get(name)).into_owned()
    }

    /// Expand an optional field, mapping blank results to `None`.
    pub fn expand_non_blank(&self, input: Option<&str>) -> Option<String> {
        input
            .map(|value| self.expand(value))
            .filter(|value| !value.trim().is_empty())
    }

    /// Copy of the variables, used as the base of the process environment.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
