//! Ad-hoc module execution: `ansible <host-pattern> -m <module> -a <args>`.

use super::add_expanded_option;
use crate::args::ArgumentList;
use crate::error::{InvocationError, Result};
use crate::expand::EnvVars;

/// # Field to Flag Mapping
///
/// | Field          | Argument            |
/// |----------------|---------------------|
/// | `host_pattern` | positional, required |
/// | `module`       | `-m <module>`       |
/// | `module_args`  | `-a <args>` (one token) |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdHocCommand {
    pub host_pattern: String,
    pub module: Option<String>,
    pub module_args: Option<String>,
}

impl AdHocCommand {
    pub fn new(host_pattern: impl Into<String>) -> Self {
        Self {
            host_pattern: host_pattern.into(),
            ..Default::default()
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_module_args(mut self, module_args: impl Into<String>) -> Self {
        self.module_args = Some(module_args.into());
        self
    }

    /// Expanded host pattern; blank is a configuration error.
    pub fn host_pattern(&self, env: &EnvVars) -> Result<String> {
        env.expand_non_blank(Some(&self.host_pattern))
            .ok_or_else(|| InvocationError::config("Host pattern must not be blank"))
    }

    pub(crate) fn add_positional(&self, args: &mut ArgumentList, env: &EnvVars) -> Result<()> {
        args.add(self.host_pattern(env)?);
        Ok(())
    }

    pub(crate) fn add_flags(&self, args: &mut ArgumentList, env: &EnvVars) {
        add_expanded_option(args, env, "-m", self.module.as_deref());
        add_expanded_option(args, env, "-a", self.module_args.as_deref());
    }
}
