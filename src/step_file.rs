//! Step definition files.
//!
//! A step file is a JSON object tagged by `kind` (`adhoc`, `playbook` or
//! `vault`) carrying the same parameters as the corresponding pipeline
//! step. Loading and validation use anyhow; conversion resolves credential
//! ids and the executable and produces an `InvocationConfig`.
//!
//! ```json
//! {
//!   "kind": "playbook",
//!   "playbook": "site.yml",
//!   "inventory": "hosts.ini",
//!   "credentials_id": "deploy-key",
//!   "extra_vars": { "release": "1.4.2", "token": { "value": "abc", "hidden": true } }
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::{AdHocCommand, Command, PlaybookCommand, VaultCommand};
use crate::credentials::{CredentialStore, lookup};
use crate::expand::EnvVars;
use crate::extra_vars::ExtraVar;
use crate::installation::{AnsibleCommand, AnsibleInstallation};
use crate::invocation::{InvocationBuilder, InvocationConfig};
use crate::inventory::Inventory;

fn default_user() -> String {
    "root".to_string()
}

fn default_hidden() -> bool {
    true
}

fn default_vault_action() -> String {
    "encrypt_string".to_string()
}

/// One step, as stored on disk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDefinition {
    Adhoc(AdHocStep),
    Playbook(PlaybookStep),
    Vault(VaultStep),
}

/// Inventory selection: `inventory` wins over `inventory_content`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InventoryOptions {
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub inventory_content: Option<String>,
    #[serde(default)]
    pub dynamic_inventory: bool,
}

impl InventoryOptions {
    pub fn to_inventory(&self) -> Inventory {
        let non_blank = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        match (non_blank(&self.inventory), non_blank(&self.inventory_content)) {
            (Some(path), _) => Inventory::Path(path),
            (None, Some(content)) => Inventory::content(content, self.dynamic_inventory),
            (None, None) => Inventory::Unspecified,
        }
    }
}

/// Parameters shared by ad-hoc and playbook steps.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionOptions {
    /// Home directory of the Ansible installation; `PATH` when absent.
    #[serde(default)]
    pub installation: Option<String>,
    #[serde(default)]
    pub credentials_id: Option<String>,
    #[serde(default)]
    pub vault_credentials_id: Option<String>,
    #[serde(default)]
    pub vault_tmp_path: Option<String>,
    #[serde(default, rename = "become")]
    pub become_enabled: bool,
    #[serde(default = "default_user")]
    pub become_user: String,
    #[serde(default)]
    pub extra_vars: ExtraVarsSpec,
    #[serde(default)]
    pub extras: Option<String>,
    #[serde(default)]
    pub colorized: bool,
    #[serde(default)]
    pub forks: i32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdHocStep {
    pub hosts: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub module_arguments: Option<String>,
    #[serde(flatten)]
    pub inventory: InventoryOptions,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    #[serde(default)]
    pub host_key_checking: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlaybookStep {
    pub playbook: String,
    #[serde(flatten)]
    pub inventory: InventoryOptions,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default = "default_user")]
    pub sudo_user: String,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub skipped_tags: Option<String>,
    #[serde(default)]
    pub start_at_task: Option<String>,
    #[serde(default)]
    pub disable_host_key_checking: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VaultStep {
    #[serde(default = "default_vault_action")]
    pub action: String,
    #[serde(default)]
    pub installation: Option<String>,
    #[serde(default)]
    pub vault_credentials_id: Option<String>,
    #[serde(default)]
    pub new_vault_credentials_id: Option<String>,
    #[serde(default)]
    pub vault_tmp_path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// `extra_vars` as a list of entries or as a map.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExtraVarsSpec {
    List(Vec<ExtraVarEntry>),
    /// Map entries are emitted in key order.
    Map(BTreeMap<String, ExtraVarValue>),
}

impl Default for ExtraVarsSpec {
    fn default() -> Self {
        ExtraVarsSpec::List(Vec::new())
    }
}

/// List entry; hidden unless `"hidden": false`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtraVarEntry {
    pub key: String,
    pub value: ScalarValue,
    #[serde(default = "default_hidden")]
    pub hidden: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExtraVarValue {
    Entry {
        value: ScalarValue,
        #[serde(default)]
        hidden: bool,
    },
    Scalar(ScalarValue),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Text(text) => f.write_str(text),
            ScalarValue::Number(number) => write!(f, "{}", number),
            ScalarValue::Bool(flag) => write!(f, "{}", flag),
        }
    }
}

impl ExtraVarsSpec {
    pub fn to_extra_vars(&self) -> Vec<ExtraVar> {
        match self {
            ExtraVarsSpec::List(entries) => entries
                .iter()
                .map(|e| ExtraVar::new(e.key.clone(), &e.value.to_string(), e.hidden))
                .collect(),
            ExtraVarsSpec::Map(map) => map
                .iter()
                .map(|(key, value)| match value {
                    ExtraVarValue::Entry { value, hidden } => {
                        ExtraVar::new(key.clone(), &value.to_string(), *hidden)
                    }
                    ExtraVarValue::Scalar(value) => ExtraVar::visible(key.clone(), &value.to_string()),
                })
                .collect(),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

impl StepDefinition {
    /// Load a step from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read step file {:?}", path.as_ref()))?;

        let step: Self = serde_json::from_str(&content).context("Failed to parse step JSON")?;

        Ok(step)
    }

    /// The tool this step runs.
    pub fn tool(&self) -> AnsibleCommand {
        match self {
            StepDefinition::Adhoc(_) => AnsibleCommand::Ansible,
            StepDefinition::Playbook(_) => AnsibleCommand::AnsiblePlaybook,
            StepDefinition::Vault(_) => AnsibleCommand::AnsibleVault,
        }
    }

    /// Installation home named by the step, if any.
    pub fn installation(&self) -> Option<&str> {
        match self {
            StepDefinition::Adhoc(step) => step.options.installation.as_deref(),
            StepDefinition::Playbook(step) => step.options.installation.as_deref(),
            StepDefinition::Vault(step) => step.installation.as_deref(),
        }
    }

    /// Check required fields. Nothing is resolved or written.
    pub fn validate(&self, env: &EnvVars) -> Result<()> {
        match self {
            StepDefinition::Adhoc(step) => {
                if step.hosts.trim().is_empty() {
                    bail!("Ad-hoc step requires 'hosts'");
                }
            }
            StepDefinition::Playbook(step) => {
                if step.playbook.trim().is_empty() {
                    bail!("Playbook step requires 'playbook'");
                }
            }
            StepDefinition::Vault(step) => {
                if is_blank(step.vault_credentials_id.as_deref()) {
                    bail!("Vault step requires 'vault_credentials_id'");
                }
                VaultCommand::new(step.action.clone()).action(env)?;
            }
        }
        Ok(())
    }

    /// Resolve credentials and the executable and build the configuration.
    pub fn into_config(
        &self,
        store: &dyn CredentialStore,
        env: &EnvVars,
        installation: &AnsibleInstallation,
    ) -> Result<InvocationConfig> {
        self.validate(env)?;
        let executable = installation.executable(self.tool())?;

        let builder = match self {
            StepDefinition::Adhoc(step) => {
                let command = AdHocCommand {
                    host_pattern: step.hosts.clone(),
                    module: step.module.clone(),
                    module_args: step.module_arguments.clone(),
                };
                connection_builder(executable, command.into(), &step.options, store, env)?
                    .with_inventory(step.inventory.to_inventory())
                    .with_host_key_checking(step.host_key_checking)
            }
            StepDefinition::Playbook(step) => {
                let command = PlaybookCommand {
                    playbook: step.playbook.clone(),
                    limit: step.limit.clone(),
                    tags: step.tags.clone(),
                    skipped_tags: step.skipped_tags.clone(),
                    start_at_task: step.start_at_task.clone(),
                };
                connection_builder(executable, command.into(), &step.options, store, env)?
                    .with_inventory(step.inventory.to_inventory())
                    .with_sudo(step.sudo, step.sudo_user.clone())
                    .with_host_key_checking(!step.disable_host_key_checking)
            }
            StepDefinition::Vault(step) => {
                let command = VaultCommand {
                    action: step.action.clone(),
                    content: step.content.clone(),
                    input: step.input.clone(),
                    output: step.output.clone(),
                };
                let builder = InvocationConfig::builder(executable, command)
                    .with_vault_credentials(lookup(store, step.vault_credentials_id.as_deref(), env)?)
                    .with_new_vault_credentials(lookup(
                        store,
                        step.new_vault_credentials_id.as_deref(),
                        env,
                    )?)
                    .with_env(env.clone());
                with_vault_tmp_path(builder, step.vault_tmp_path.as_deref(), env)
            }
        };

        Ok(builder.build()?)
    }
}

fn connection_builder(
    executable: PathBuf,
    command: Command,
    options: &ConnectionOptions,
    store: &dyn CredentialStore,
    env: &EnvVars,
) -> Result<InvocationBuilder> {
    let mut builder = InvocationConfig::builder(executable, command)
        .with_become(options.become_enabled, options.become_user.clone())
        .with_forks(options.forks)
        .with_credentials(lookup(store, options.credentials_id.as_deref(), env)?)
        .with_vault_credentials(lookup(store, options.vault_credentials_id.as_deref(), env)?)
        .with_extra_vars(options.extra_vars.to_extra_vars())
        .with_colorized(options.colorized)
        .with_unbuffered(true)
        .with_prepend_password(true)
        .with_env(env.clone());
    if let Some(extras) = &options.extras {
        builder = builder.with_additional_parameters(extras.clone());
    }
    Ok(with_vault_tmp_path(
        builder,
        options.vault_tmp_path.as_deref(),
        env,
    ))
}

fn with_vault_tmp_path(
    builder: InvocationBuilder,
    path: Option<&str>,
    env: &EnvVars,
) -> InvocationBuilder {
    match env.expand_non_blank(path) {
        Some(path) => builder.with_vault_tmp_path(path),
        None => builder,
    }
}
