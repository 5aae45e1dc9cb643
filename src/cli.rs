use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// ansible-step - Run Ansible as a CI build step
#[derive(Parser)]
#[command(name = "ansible-step")]
#[command(about = "Run ansible, ansible-playbook and ansible-vault steps with managed credentials")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: build the command line and create the temp files,
    /// but do not launch the tool.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a step file
    Run(StepArgs),
    /// Validate a step file without resolving credentials
    Validate {
        /// Path to the step file
        step: PathBuf,
    },
    /// Print the masked command line a step would run
    Render(StepArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StepArgs {
    /// Path to the step file
    pub step: PathBuf,

    /// JSON file mapping credential ids to credentials
    #[arg(short, long)]
    pub credentials: Option<PathBuf>,

    /// Build workspace (working directory of the tool)
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Ansible installation home, overriding the step's `installation`
    #[arg(short, long)]
    pub installation: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
