//! ansible-step - Main entry point
//!
//! Loads a step file, resolves its credentials and installation, and runs
//! the resulting invocation against a local workspace.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use ansible_step::cli::{Cli, Commands, StepArgs};
use ansible_step::{
    AnsibleInstallation, DryRunRunner, EnvVars, Invocation, InvocationConfig, InvocationError,
    LocalProcessRunner, LocalWorkspace, MemoryCredentialStore, ProcessRunner, StepDefinition,
    process_guard,
};

/// Initialize the tracing subscriber; RUST_LOG overrides the default level
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let result = match &cli.command {
        Commands::Validate { step } => validate_step(step).map(|_| true),
        Commands::Run(args) => run_step(args, cli.dry_run),
        Commands::Render(args) => render_step(args).map(|_| true),
    };

    if let Some(signal) = process_guard::cancellation_signal() {
        warn!("Step cancelled by signal {}", signal);
        return exit_code_for_signal(signal);
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if let Some(InvocationError::Cancelled { signal }) = e.downcast_ref::<InvocationError>() {
                return exit_code_for_signal(*signal);
            }
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn exit_code_for_signal(signal: i32) -> ExitCode {
    ExitCode::from(u8::try_from(128 + signal).unwrap_or(u8::MAX))
}

fn validate_step(path: &Path) -> Result<()> {
    info!("Validating step file: {:?}", path);
    let step = StepDefinition::load_from_file(path)?;
    step.validate(&EnvVars::from_process())?;
    println!("✓ Step file is valid: {:?}", path);
    Ok(())
}

/// Load the step and everything it refers to.
fn prepare(args: &StepArgs) -> Result<(InvocationConfig, LocalWorkspace)> {
    fs::create_dir_all(&args.workspace)
        .with_context(|| format!("Failed to create workspace {:?}", args.workspace))?;
    let root = fs::canonicalize(&args.workspace)
        .with_context(|| format!("Failed to resolve workspace {:?}", args.workspace))?;

    let mut env = EnvVars::from_process();
    if !env.contains_key("WORKSPACE") {
        env.insert("WORKSPACE", root.display().to_string());
    }

    let step = StepDefinition::load_from_file(&args.step)?;

    let store = match &args.credentials {
        Some(path) => MemoryCredentialStore::load_from_file(path)
            .with_context(|| format!("Failed to load credentials from {:?}", path))?,
        None => MemoryCredentialStore::new(),
    };
    debug!("{} credential(s) available", store.len());

    let installation = match &args.installation {
        Some(home) => AnsibleInstallation::new("command line", Some(home.clone())),
        None => match env.expand_non_blank(step.installation()) {
            Some(home) => AnsibleInstallation::new("step", Some(PathBuf::from(home))),
            None => AnsibleInstallation::system(),
        },
    };

    let config = step.into_config(&store, &env, &installation)?;
    Ok((config, LocalWorkspace::new(root)))
}

fn run_step(args: &StepArgs, dry_run: bool) -> Result<bool> {
    let (config, workspace) = prepare(args)?;
    let tool = config.tool_name();
    let mut invocation = Invocation::new(config, &workspace);

    let mut local;
    let mut dry;
    let runner: &mut dyn ProcessRunner = if dry_run {
        dry = DryRunRunner::new();
        &mut dry
    } else {
        local = LocalProcessRunner::stdout();
        &mut local
    };

    let outcome = invocation.execute(runner);
    for warning in invocation.teardown_warnings() {
        println!("[WARNING] {}", warning);
    }
    let success = outcome?;

    if dry_run {
        if let Some(line) = invocation.command_line() {
            println!("[DRY RUN] {}", line);
        }
    }
    if success {
        info!("{} completed successfully", tool);
    } else {
        error!("{} execution failed", tool);
    }
    Ok(success)
}

fn render_step(args: &StepArgs) -> Result<()> {
    let (config, workspace) = prepare(args)?;
    let mut invocation = Invocation::new(config, &workspace);
    invocation.execute(&mut DryRunRunner::new())?;
    if let Some(line) = invocation.command_line() {
        println!("{}", line);
    }
    Ok(())
}
