//! Teardown tests
//!
//! These tests verify that every temp artifact created during `execute`
//! is deleted, or reported, on every exit path:
//! - success and non-zero exit
//! - runner errors
//! - materialization failures part way through
//! - panics inside the runner
//! - deletions that fail while the file is still present

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ansible_step::{
    AdHocCommand, CredentialMaterial, DeleteOutcome, Invocation, InvocationConfig,
    InvocationError, InvocationState, Inventory, LocalWorkspace, PlaybookCommand, ProcessExit,
    ProcessRequest, ProcessRunner, Result, Workspace,
};

/// Local workspace that remembers created files and can be told to fail.
struct TestWorkspace {
    inner: LocalWorkspace,
    created: Mutex<Vec<PathBuf>>,
    fail_delete: bool,
    fail_chmod_for: Option<&'static str>,
}

impl TestWorkspace {
    fn new(dir: &Path) -> Self {
        Self {
            inner: LocalWorkspace::new(dir.join("job")),
            created: Mutex::new(Vec::new()),
            fail_delete: false,
            fail_chmod_for: None,
        }
    }

    fn created(&self) -> Vec<PathBuf> {
        self.created.lock().expect("lock").clone()
    }
}

impl Workspace for TestWorkspace {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn temp_dir(&self) -> &Path {
        self.inner.temp_dir()
    }

    fn create_temp_file(
        &self,
        dir: Option<&Path>,
        prefix: &str,
        suffix: &str,
        content: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.inner.create_temp_file(dir, prefix, suffix, content)?;
        self.created.lock().expect("lock").push(path.clone());
        Ok(path)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        if let Some(prefix) = self.fail_chmod_for {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            if name.is_some_and(|n| n.starts_with(prefix)) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "chmod refused"));
            }
        }
        self.inner.set_mode(path, mode)
    }

    fn delete(&self, path: &Path) -> DeleteOutcome {
        if self.fail_delete {
            return DeleteOutcome::Failed(io::Error::new(io::ErrorKind::PermissionDenied, "busy"));
        }
        self.inner.delete(path)
    }
}

enum Behaviour {
    Exit(i32),
    Error,
    Panic,
}

struct ScriptedRunner {
    behaviour: Behaviour,
    calls: usize,
}

impl ScriptedRunner {
    fn new(behaviour: Behaviour) -> Self {
        Self { behaviour, calls: 0 }
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&mut self, _request: ProcessRequest<'_>) -> Result<ProcessExit> {
        self.calls += 1;
        match self.behaviour {
            Behaviour::Exit(code) => Ok(ProcessExit::from_code(code)),
            Behaviour::Error => Err(InvocationError::Process(io::Error::other("launcher lost"))),
            Behaviour::Panic => panic!("runner exploded"),
        }
    }
}

/// Private key with passphrase, vault password and dynamic inventory:
/// four temp files.
fn config_with_all_artifacts() -> InvocationConfig {
    InvocationConfig::builder("ansible-playbook", PlaybookCommand::new("site.yml"))
        .with_inventory(Inventory::content("#!/bin/sh\necho '{}'", true))
        .with_credentials(Some(CredentialMaterial::private_key("ci", "KEY", Some("pp"))))
        .with_vault_credentials(Some(CredentialMaterial::vault_text("vault")))
        .build()
        .expect("config")
}

fn assert_all_gone(paths: &[PathBuf]) {
    for path in paths {
        assert!(!path.exists(), "{:?} survived teardown", path);
    }
}

#[test]
fn test_teardown_after_success_and_failure() {
    for code in [0, 2] {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = TestWorkspace::new(dir.path());
        let mut runner = ScriptedRunner::new(Behaviour::Exit(code));
        let mut invocation = Invocation::new(config_with_all_artifacts(), &ws);

        let success = invocation.execute(&mut runner).expect("execute");
        assert_eq!(success, code == 0);
        assert_eq!(ws.created().len(), 4);
        assert_all_gone(&ws.created());
        assert_eq!(invocation.state(), InvocationState::TornDown);
    }
}

#[test]
fn test_teardown_after_runner_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = TestWorkspace::new(dir.path());
    let mut runner = ScriptedRunner::new(Behaviour::Error);
    let mut invocation = Invocation::new(config_with_all_artifacts(), &ws);

    let err = invocation.execute(&mut runner).unwrap_err();
    assert!(matches!(err, InvocationError::Process(_)));
    assert_eq!(ws.created().len(), 4);
    assert_all_gone(&ws.created());
}

#[test]
fn test_teardown_after_materialization_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ws = TestWorkspace::new(dir.path());
    ws.fail_chmod_for = Some("vault");
    let mut runner = ScriptedRunner::new(Behaviour::Exit(0));
    let mut invocation = Invocation::new(config_with_all_artifacts(), &ws);

    let err = invocation.execute(&mut runner).unwrap_err();
    assert!(matches!(err, InvocationError::Materialization { .. }));
    assert!(err.is_pre_launch());
    assert_eq!(runner.calls, 0);
    // inventory, key, askpass, then the vault file whose chmod failed
    assert_eq!(ws.created().len(), 4);
    assert_all_gone(&ws.created());
}

#[test]
fn test_teardown_after_panic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = TestWorkspace::new(dir.path());
    let mut runner = ScriptedRunner::new(Behaviour::Panic);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut invocation = Invocation::new(config_with_all_artifacts(), &ws);
        invocation.execute(&mut runner)
    }));

    assert!(result.is_err());
    assert_eq!(ws.created().len(), 4);
    assert_all_gone(&ws.created());
}

#[test]
fn test_failed_delete_of_present_file_is_warned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ws = TestWorkspace::new(dir.path());
    ws.fail_delete = true;
    let mut runner = ScriptedRunner::new(Behaviour::Exit(0));

    let config = InvocationConfig::builder("ansible", AdHocCommand::new("all"))
        .with_credentials(Some(CredentialMaterial::private_key("ci", "KEY", None)))
        .build()
        .expect("config");
    let mut invocation = Invocation::new(config, &ws);
    assert!(invocation.execute(&mut runner).expect("execute"));

    let created = ws.created();
    assert_eq!(created.len(), 1);
    assert!(created[0].exists());
    assert_eq!(invocation.teardown_warnings().len(), 1);
    assert!(invocation.teardown_warnings()[0].contains(&created[0].display().to_string()));
}

#[test]
fn test_no_artifacts_no_warnings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = TestWorkspace::new(dir.path());
    let mut runner = ScriptedRunner::new(Behaviour::Exit(0));

    let config = InvocationConfig::builder("ansible", AdHocCommand::new("all"))
        .with_inventory(Inventory::path("/tmp/hosts"))
        .build()
        .expect("config");
    let mut invocation = Invocation::new(config, &ws);
    invocation.execute(&mut runner).expect("execute");

    assert!(ws.created().is_empty());
    assert!(invocation.teardown_warnings().is_empty());
}
