//! Vault operations: `ansible-vault <action> ...`.
//!
//! Only actions that run without a terminal are accepted. `create`, `edit`
//! and `view` open an editor or pager and are rejected before anything is
//! written or launched.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::args::ArgumentList;
use crate::error::{InvocationError, Result};
use crate::expand::EnvVars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum VaultAction {
    Encrypt,
    EncryptString,
    Decrypt,
    Rekey,
    Create,
    Edit,
    View,
}

impl VaultAction {
    /// Needs a terminal (editor or pager).
    pub fn is_interactive(self) -> bool {
        matches!(self, VaultAction::Create | VaultAction::Edit | VaultAction::View)
    }

    pub fn takes_content(self) -> bool {
        self == VaultAction::EncryptString
    }
}

/// # Field to Argument Mapping
///
/// | Field     | Argument                              |
/// |-----------|---------------------------------------|
/// | `action`  | positional, validated                 |
/// | `output`  | `--output <path>`                     |
/// | `content` | positional, masked (`encrypt_string`) |
/// | `input`   | positional (other actions)            |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultCommand {
    pub action: String,
    pub content: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
}

impl Default for VaultCommand {
    fn default() -> Self {
        Self {
            action: VaultAction::EncryptString.to_string(),
            content: None,
            input: None,
            output: None,
        }
    }
}

impl VaultCommand {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Parse and check the configured action.
    pub fn action(&self, env: &EnvVars) -> Result<VaultAction> {
        let name = env.expand(&self.action);
        let name = name.trim();
        let action = VaultAction::from_str(name).map_err(|_| {
            InvocationError::config(format!(
                "Unknown vault action '{}', expected one of encrypt, encrypt_string, decrypt, rekey",
                name
            ))
        })?;
        if action.is_interactive() {
            return Err(InvocationError::config(format!(
                "{}: ansible-vault does not support interactive vault actions such as create, edit, or view",
                action
            )));
        }
        Ok(action)
    }

    pub(crate) fn add_positional(&self, args: &mut ArgumentList, env: &EnvVars) -> Result<()> {
        args.add(self.action(env)?.to_string());
        Ok(())
    }

    /// `--output` and the content or input operand.
    pub(crate) fn add_operands(&self, args: &mut ArgumentList, env: &EnvVars) -> Result<()> {
        let action = self.action(env)?;
        if let Some(output) = env.expand_non_blank(self.output.as_deref()) {
            args.add_option("--output", output);
        }
        if action.takes_content() {
            if let Some(content) = self.content.as_deref().filter(|c| !c.is_empty()) {
                args.add_masked(env.expand(content));
            }
        } else if let Some(input) = env.expand_non_blank(self.input.as_deref()) {
            args.add(input);
        }
        Ok(())
    }
}
