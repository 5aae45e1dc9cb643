//! Invocation configuration, command-line assembly and execution.
//!
//! # Argument order
//!
//! Ad-hoc and playbook runs share one skeleton:
//!
//! ```text
//! [sshpass -p******] exe <positional> [-i inv] [kind flags] [-b [--become-user u]]
//! [-s [-U u]] [-f n] [credentials] [--vault-password-file p] [-e k=v ...] [extras]
//! ```
//!
//! Vault operations use:
//!
//! ```text
//! exe <action> [--vault-password-file p] [--new-vault-password-file p] [--output o] [content | input]
//! ```
//!
//! # Lifecycle
//!
//! An `Invocation` runs at most once. Every temp artifact created while
//! building the command line is owned by an `ArtifactLedger` that is torn
//! down when `execute` returns, whatever the outcome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::args::ArgumentList;
use crate::commands::Command;
use crate::credentials::{
    CredentialMaterial, append_credentials, append_vault_password_file, prepend_password,
};
use crate::error::{InvocationError, Result};
use crate::expand::EnvVars;
use crate::extra_vars::ExtraVar;
use crate::inventory::Inventory;
use crate::process_runner::{ProcessRequest, ProcessRunner};
use crate::workspace::{ArtifactKind, ArtifactLedger, Workspace};

/// Immutable parameters of one step execution. Built with
/// [`InvocationConfig::builder`].
#[derive(Debug)]
pub struct InvocationConfig {
    executable: PathBuf,
    command: Command,
    inventory: Inventory,
    become_enabled: bool,
    become_user: Option<String>,
    sudo_enabled: bool,
    sudo_user: Option<String>,
    forks: u32,
    credentials: Option<CredentialMaterial>,
    vault_credentials: Option<CredentialMaterial>,
    new_vault_credentials: Option<CredentialMaterial>,
    extra_vars: Vec<ExtraVar>,
    additional_parameters: Option<String>,
    unbuffered: bool,
    colorized: bool,
    host_key_checking: bool,
    prepend_password: bool,
    vault_tmp_path: Option<PathBuf>,
    env: EnvVars,
}

impl InvocationConfig {
    pub fn builder(executable: impl Into<PathBuf>, command: impl Into<Command>) -> InvocationBuilder {
        InvocationBuilder {
            config: InvocationConfig {
                executable: executable.into(),
                command: command.into(),
                inventory: Inventory::Unspecified,
                become_enabled: false,
                become_user: None,
                sudo_enabled: false,
                sudo_user: None,
                forks: 0,
                credentials: None,
                vault_credentials: None,
                new_vault_credentials: None,
                extra_vars: Vec::new(),
                additional_parameters: None,
                unbuffered: false,
                colorized: false,
                host_key_checking: true,
                prepend_password: false,
                vault_tmp_path: None,
                env: EnvVars::new(),
            },
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn forks(&self) -> u32 {
        self.forks
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    /// Name used in execution failures: the executable's file name.
    pub fn tool_name(&self) -> String {
        self.executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.tool().to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(InvocationError::config("Executable path must not be empty"));
        }
        self.command.validate(&self.env)?;

        if self.credentials.as_ref().is_some_and(|c| !c.is_ssh()) {
            return Err(InvocationError::config(
                "SSH credentials must be a private key or a username with password",
            ));
        }
        for vault in [&self.vault_credentials, &self.new_vault_credentials] {
            if vault.as_ref().is_some_and(|c| !c.is_vault()) {
                return Err(InvocationError::config(
                    "Vault credentials must be a secret file or secret text",
                ));
            }
        }
        if self.new_vault_credentials.is_some() && !self.command.is_vault() {
            return Err(InvocationError::config(
                "New vault credentials only apply to vault operations",
            ));
        }
        Ok(())
    }
}

/// Builder for [`InvocationConfig`]. All checks run in [`build`](Self::build).
#[derive(Debug)]
pub struct InvocationBuilder {
    config: InvocationConfig,
}

impl InvocationBuilder {
    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.config.inventory = inventory;
        self
    }

    /// `-b`, with `--become-user` when `user` expands to something non-blank.
    pub fn with_become(mut self, enabled: bool, user: impl Into<String>) -> Self {
        self.config.become_enabled = enabled;
        self.config.become_user = Some(user.into());
        self
    }

    /// Legacy `-s`, with `-U` when `user` expands to something non-blank.
    pub fn with_sudo(mut self, enabled: bool, user: impl Into<String>) -> Self {
        self.config.sudo_enabled = enabled;
        self.config.sudo_user = Some(user.into());
        self
    }

    /// Negative counts are clamped to 0, which omits `-f`.
    pub fn with_forks(mut self, forks: i32) -> Self {
        self.config.forks = forks.max(0) as u32;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<CredentialMaterial>) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn with_vault_credentials(mut self, credentials: Option<CredentialMaterial>) -> Self {
        self.config.vault_credentials = credentials;
        self
    }

    /// Target password of `rekey`.
    pub fn with_new_vault_credentials(mut self, credentials: Option<CredentialMaterial>) -> Self {
        self.config.new_vault_credentials = credentials;
        self
    }

    pub fn with_extra_var(mut self, var: ExtraVar) -> Self {
        self.config.extra_vars.push(var);
        self
    }

    pub fn with_extra_vars(mut self, vars: impl IntoIterator<Item = ExtraVar>) -> Self {
        self.config.extra_vars.extend(vars);
        self
    }

    /// Free text appended after everything else, split like a shell would.
    pub fn with_additional_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.config.additional_parameters = Some(parameters.into());
        self
    }

    pub fn with_unbuffered(mut self, unbuffered: bool) -> Self {
        self.config.unbuffered = unbuffered;
        self
    }

    pub fn with_colorized(mut self, colorized: bool) -> Self {
        self.config.colorized = colorized;
        self
    }

    pub fn with_host_key_checking(mut self, enabled: bool) -> Self {
        self.config.host_key_checking = enabled;
        self
    }

    /// Lead with `sshpass -p<password>` for username/password credentials.
    pub fn with_prepend_password(mut self, prepend: bool) -> Self {
        self.config.prepend_password = prepend;
        self
    }

    /// Directory for vault password files instead of the workspace temp dir.
    pub fn with_vault_tmp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vault_tmp_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvVars) -> Self {
        self.config.env = env;
        self
    }

    pub fn build(self) -> Result<InvocationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Output of [`build_command_line`].
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub args: ArgumentList,
    pub environment: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

/// Assemble the argument vector and environment, creating temp artifacts
/// in `ledger` as needed.
pub fn build_command_line(
    config: &InvocationConfig,
    ledger: &mut ArtifactLedger<'_>,
) -> Result<PreparedCommand> {
    let env = &config.env;
    let mut args = ArgumentList::new();
    let mut environment = env.to_map();
    let mut warnings = Vec::new();

    if config.prepend_password {
        prepend_password(config.credentials.as_ref(), &mut args);
    }
    args.add(config.executable.display().to_string());

    let vault_dir = config.vault_tmp_path.as_deref();
    match &config.command {
        Command::AdHoc(cmd) => {
            cmd.add_positional(&mut args, env)?;
            config.inventory.add_argument(&mut args, env, ledger)?;
            cmd.add_flags(&mut args, env);
            add_shared_tail(config, &mut args, &mut environment, &mut warnings, ledger)?;
        }
        Command::Playbook(cmd) => {
            cmd.add_positional(&mut args, env)?;
            config.inventory.add_argument(&mut args, env, ledger)?;
            cmd.add_flags(&mut args, env);
            add_shared_tail(config, &mut args, &mut environment, &mut warnings, ledger)?;
        }
        Command::Vault(cmd) => {
            cmd.add_positional(&mut args, env)?;
            append_vault_password_file(
                config.vault_credentials.as_ref(),
                "--vault-password-file",
                ArtifactKind::VaultPassword,
                vault_dir,
                &mut args,
                ledger,
            )?;
            append_vault_password_file(
                config.new_vault_credentials.as_ref(),
                "--new-vault-password-file",
                ArtifactKind::NewVaultPassword,
                vault_dir,
                &mut args,
                ledger,
            )?;
            cmd.add_operands(&mut args, env)?;
        }
    }

    if config.unbuffered {
        environment.insert("PYTHONUNBUFFERED".into(), "1".into());
    }
    if config.colorized {
        environment.insert("ANSIBLE_FORCE_COLOR".into(), "true".into());
    }
    if !config.host_key_checking {
        environment.insert("ANSIBLE_HOST_KEY_CHECKING".into(), "False".into());
    }

    Ok(PreparedCommand {
        args,
        environment,
        warnings,
    })
}

/// Become, sudo, forks, credentials, vault password, extra vars, extras.
fn add_shared_tail(
    config: &InvocationConfig,
    args: &mut ArgumentList,
    environment: &mut BTreeMap<String, String>,
    warnings: &mut Vec<String>,
    ledger: &mut ArtifactLedger<'_>,
) -> Result<()> {
    let env = &config.env;

    if config.become_enabled {
        args.add("-b");
        match env.expand_non_blank(config.become_user.as_deref()) {
            Some(user) => {
                args.add_option("--become-user", user);
            }
            None => warnings.push("Become user is blank, --become-user omitted".to_string()),
        }
    }
    if config.sudo_enabled {
        args.add("-s");
        match env.expand_non_blank(config.sudo_user.as_deref()) {
            Some(user) => {
                args.add_option("-U", user);
            }
            None => warnings.push("Sudo user is blank, -U omitted".to_string()),
        }
    }
    if config.forks > 0 {
        args.add_option("-f", config.forks.to_string());
    }

    append_credentials(config.credentials.as_ref(), args, environment, ledger)?;
    append_vault_password_file(
        config.vault_credentials.as_ref(),
        "--vault-password-file",
        ArtifactKind::VaultPassword,
        config.vault_tmp_path.as_deref(),
        args,
        ledger,
    )?;

    for var in &config.extra_vars {
        var.add_argument(args, env);
    }
    if let Some(parameters) = env.expand_non_blank(config.additional_parameters.as_deref()) {
        args.add_tokenized(&parameters);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Configured,
    Executing,
    TornDown,
}

/// One single-use execution of a configured step.
pub struct Invocation<'w> {
    config: InvocationConfig,
    workspace: &'w dyn Workspace,
    state: InvocationState,
    command_line: Option<String>,
    warnings: Vec<String>,
    teardown_warnings: Vec<String>,
}

impl<'w> Invocation<'w> {
    pub fn new(config: InvocationConfig, workspace: &'w dyn Workspace) -> Self {
        Self {
            config,
            workspace,
            state: InvocationState::Configured,
            command_line: None,
            warnings: Vec::new(),
            teardown_warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &InvocationConfig {
        &self.config
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Masked command line of the last execution.
    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    /// Non-fatal configuration warnings recorded while building.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Temp files that could not be deleted.
    pub fn teardown_warnings(&self) -> &[String] {
        &self.teardown_warnings
    }

    /// Build the command line, run it, and delete every temp artifact.
    /// Returns whether the tool exited with code 0.
    pub fn execute(&mut self, runner: &mut dyn ProcessRunner) -> Result<bool> {
        if self.state != InvocationState::Configured {
            return Err(InvocationError::AlreadyExecuted);
        }
        self.state = InvocationState::Executing;

        let mut ledger = ArtifactLedger::new(self.workspace);
        let outcome = self.launch(&mut ledger, runner);
        self.teardown_warnings = ledger.tear_down();
        self.state = InvocationState::TornDown;
        outcome
    }

    /// Like [`execute`](Self::execute), with a non-zero exit reported as
    /// an execution error.
    pub fn run(&mut self, runner: &mut dyn ProcessRunner) -> Result<()> {
        if self.execute(runner)? {
            Ok(())
        } else {
            Err(InvocationError::execution(self.config.tool_name()))
        }
    }

    fn launch(
        &mut self,
        ledger: &mut ArtifactLedger<'_>,
        runner: &mut dyn ProcessRunner,
    ) -> Result<bool> {
        let prepared = build_command_line(&self.config, ledger)?;
        for warning in &prepared.warnings {
            warn!("{}", warning);
        }
        self.warnings = prepared.warnings;

        let command_line = prepared.args.to_command_line();
        info!("{}", command_line);
        self.command_line = Some(command_line);

        let exit = runner.run(ProcessRequest {
            args: &prepared.args,
            environment: &prepared.environment,
            working_dir: self.workspace.root(),
        })?;
        Ok(exit.success())
    }
}
