//! ansible-step Library
//!
//! Builds and runs `ansible`, `ansible-playbook` and `ansible-vault`
//! invocations for a CI host: ordered argument vectors with masked secrets,
//! the process environment, and short-lived credential files that are
//! always removed after the run.

pub mod args;
pub mod cli;
pub mod commands;
pub mod credentials;
pub mod error;
pub mod expand;
pub mod extra_vars;
pub mod installation;
pub mod inventory;
pub mod invocation;
pub mod process_guard;
pub mod process_runner;
pub mod step_file;
pub mod workspace;

// Re-export main types for convenience
pub use args::{ArgumentList, ArgumentToken, MASK};
pub use commands::{AdHocCommand, Command, PlaybookCommand, VaultAction, VaultCommand};
pub use credentials::{CredentialMaterial, CredentialRecord, CredentialStore, MemoryCredentialStore};
pub use error::{InvocationError, Result};
pub use expand::EnvVars;
pub use extra_vars::ExtraVar;
pub use installation::{AnsibleCommand, AnsibleInstallation};
pub use inventory::Inventory;
pub use invocation::{
    Invocation, InvocationBuilder, InvocationConfig, InvocationState, PreparedCommand,
    build_command_line,
};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use process_runner::{
    DryRunRunner, LocalProcessRunner, ProcessExit, ProcessRequest, ProcessRunner, RecordedRequest,
};
pub use step_file::StepDefinition;
pub use workspace::{ArtifactKind, ArtifactLedger, DeleteOutcome, LocalWorkspace, TempArtifact, Workspace};
