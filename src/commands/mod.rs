//! The three invocation kinds and their kind-specific arguments.
//!
//! Each kind knows its positional argument and its own flags; the shared
//! skeleton (inventory, become, forks, credentials, extra vars) is assembled
//! by `invocation::build_command_line`.

pub mod adhoc;
pub mod playbook;
pub mod vault;

pub use adhoc::AdHocCommand;
pub use playbook::PlaybookCommand;
pub use vault::{VaultAction, VaultCommand};

use crate::error::Result;
use crate::expand::EnvVars;
use crate::installation::AnsibleCommand;

/// What one invocation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AdHoc(AdHocCommand),
    Playbook(PlaybookCommand),
    Vault(VaultCommand),
}

impl Command {
    /// The tool this kind is normally run with.
    pub fn tool(&self) -> AnsibleCommand {
        match self {
            Command::AdHoc(_) => AnsibleCommand::Ansible,
            Command::Playbook(_) => AnsibleCommand::AnsiblePlaybook,
            Command::Vault(_) => AnsibleCommand::AnsibleVault,
        }
    }

    /// Check required fields and allowed values without touching the disk.
    pub fn validate(&self, env: &EnvVars) -> Result<()> {
        match self {
            Command::AdHoc(cmd) => cmd.host_pattern(env).map(|_| ()),
            Command::Playbook(cmd) => cmd.playbook(env).map(|_| ()),
            Command::Vault(cmd) => cmd.action(env).map(|_| ()),
        }
    }

    pub fn is_vault(&self) -> bool {
        matches!(self, Command::Vault(_))
    }
}

impl From<AdHocCommand> for Command {
    fn from(cmd: AdHocCommand) -> Self {
        Command::AdHoc(cmd)
    }
}

impl From<PlaybookCommand> for Command {
    fn from(cmd: PlaybookCommand) -> Self {
        Command::Playbook(cmd)
    }
}

impl From<VaultCommand> for Command {
    fn from(cmd: VaultCommand) -> Self {
        Command::Vault(cmd)
    }
}

/// Append `flag <value>` when `value` is non-blank after expansion.
pub(crate) fn add_expanded_option(
    args: &mut crate::args::ArgumentList,
    env: &EnvVars,
    flag: &str,
    value: Option<&str>,
) {
    if let Some(value) = env.expand_non_blank(value) {
        args.add_option(flag, value);
    }
}
