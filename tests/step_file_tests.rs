//! Step file tests
//!
//! These tests verify:
//! - Step files plus a credentials file produce the expected command line
//! - Credential ids are resolved through the store and `${VAR}` expansion
//! - Unknown credential ids and missing executables are configuration errors
//! - A full local run against a stand-in executable

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ansible_step::{
    AnsibleInstallation, DryRunRunner, EnvVars, Invocation, LocalProcessRunner, LocalWorkspace,
    MemoryCredentialStore, StepDefinition,
};

const CREDENTIALS: &str = r#"{
    "ssh-password": {"type": "username_password", "username": "mylogin", "password": "aStrongSecretPassword"},
    "deploy-key": {"type": "private_key", "username": "deploy", "private_key": "KEYDATA"},
    "vault": {"type": "vault_text", "secret": "vault-pass"}
}"#;

/// An installation home holding stand-in executables that print their
/// arguments and the content of `--private-key` files.
fn fake_installation(dir: &Path) -> AnsibleInstallation {
    let home = dir.join("ansible-home");
    fs::create_dir_all(&home).expect("mkdir");
    let script = r#"#!/bin/sh
echo "args: $*"
while [ $# -gt 0 ]; do
  if [ "$1" = "--private-key" ]; then echo "key: $(cat "$2")"; fi
  shift
done
"#;
    for name in ["ansible", "ansible-playbook", "ansible-vault"] {
        let path = home.join(name);
        fs::write(&path, script).expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
    AnsibleInstallation::new("test", Some(home))
}

fn store(dir: &Path) -> MemoryCredentialStore {
    let path = dir.join("credentials.json");
    fs::write(&path, CREDENTIALS).expect("write");
    MemoryCredentialStore::load_from_file(&path).expect("load credentials")
}

fn step(json: &str) -> StepDefinition {
    serde_json::from_str(json).expect("parse step")
}

fn render(step: &StepDefinition, dir: &Path, env: &EnvVars) -> (String, PathBuf) {
    let installation = fake_installation(dir);
    let config = step
        .into_config(&store(dir), env, &installation)
        .expect("config");
    let ws = LocalWorkspace::new(dir.join("job"));
    let mut runner = DryRunRunner::new();
    Invocation::new(config, &ws)
        .execute(&mut runner)
        .expect("execute");
    let home = installation.home.clone().expect("home");
    (runner.requests()[0].command_line(), home)
}

#[test]
fn test_adhoc_step_with_password_credentials() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(
        r#"{
            "kind": "adhoc",
            "hosts": "localhost",
            "module": "ping",
            "inventory": "/tmp/hosts",
            "forks": 5,
            "credentials_id": "ssh-password"
        }"#,
    );
    let (line, home) = render(&step, dir.path(), &EnvVars::new());
    assert_eq!(
        line,
        format!(
            "sshpass ****** {}/ansible localhost -i /tmp/hosts -m ping -f 5 -u mylogin -k",
            home.display()
        )
    );
}

#[test]
fn test_playbook_step_with_expanded_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env: EnvVars = [("KEY_ID", "deploy-key"), ("BOOK", "site.yml")]
        .into_iter()
        .collect();
    let step = step(
        r#"{
            "kind": "playbook",
            "playbook": "${BOOK}",
            "credentials_id": "${KEY_ID}",
            "become": true,
            "extra_vars": {"release": "1.4.2", "token": {"value": "abc", "hidden": true}},
            "extras": "--check"
        }"#,
    );
    let (line, home) = render(&step, dir.path(), &env);

    let prefix = format!("{}/ansible-playbook site.yml -b --become-user root --private-key ", home.display());
    assert!(line.starts_with(&prefix), "{}", line);
    assert!(line.ends_with(" -u deploy -e release=1.4.2 -e ****** --check"), "{}", line);
}

#[test]
fn test_list_extra_vars_masked_unless_marked_visible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(
        r#"{
            "kind": "adhoc",
            "hosts": "all",
            "extra_vars": [
                {"key": "db_password", "value": "hunter2"},
                {"key": "region", "value": "eu-west-1", "hidden": false}
            ]
        }"#,
    );
    let (line, home) = render(&step, dir.path(), &EnvVars::new());
    assert_eq!(
        line,
        format!("{}/ansible all -e ****** -e region=eu-west-1", home.display())
    );
    assert!(!line.contains("hunter2"));
}

#[test]
fn test_unknown_credentials_id_is_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(r#"{"kind": "adhoc", "hosts": "all", "credentials_id": "nope"}"#);
    let err = step
        .into_config(&store(dir.path()), &EnvVars::new(), &fake_installation(dir.path()))
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_wrong_credentials_family_is_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(r#"{"kind": "adhoc", "hosts": "all", "credentials_id": "vault"}"#);
    assert!(step
        .into_config(&store(dir.path()), &EnvVars::new(), &fake_installation(dir.path()))
        .is_err());
}

#[test]
fn test_missing_executable_is_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(r#"{"kind": "playbook", "playbook": "site.yml"}"#);
    let installation = AnsibleInstallation::new("empty", Some(dir.path().join("nowhere")));
    let err = step
        .into_config(&store(dir.path()), &EnvVars::new(), &installation)
        .unwrap_err();
    assert!(err.to_string().contains("Ansible executable not found"));
}

#[test]
fn test_local_run_sees_key_file_then_removes_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(
        r#"{"kind": "adhoc", "hosts": "all", "module": "ping", "credentials_id": "deploy-key"}"#,
    );
    let env: EnvVars = [("PATH", "/usr/bin:/bin")].into_iter().collect();
    let config = step
        .into_config(&store(dir.path()), &env, &fake_installation(dir.path()))
        .expect("config");

    let root = dir.path().join("job");
    fs::create_dir_all(&root).expect("mkdir");
    let ws = LocalWorkspace::new(&root);
    let mut runner = LocalProcessRunner::new(Vec::new());
    let mut invocation = Invocation::new(config, &ws);
    assert!(invocation.execute(&mut runner).expect("execute"));

    let output = String::from_utf8(runner.into_sink()).expect("utf8");
    assert!(output.contains("key: KEYDATA"), "{}", output);
    assert!(output.contains("-u deploy"), "{}", output);

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("job@tmp"))
        .expect("temp dir")
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_vault_step_requires_vault_credentials() {
    let env = EnvVars::new();
    assert!(step(r#"{"kind": "vault", "content": "x"}"#).validate(&env).is_err());
    assert!(step(r#"{"kind": "vault", "vault_credentials_id": "vault", "content": "x"}"#)
        .validate(&env)
        .is_ok());
}

#[test]
fn test_vault_step_renders_masked_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let step = step(
        r#"{"kind": "vault", "vault_credentials_id": "vault", "content": "aVerySecretValue"}"#,
    );
    let (line, home) = render(&step, dir.path(), &EnvVars::new());
    assert!(line.starts_with(&format!("{}/ansible-vault encrypt_string --vault-password-file ", home.display())));
    assert!(line.ends_with(" ******"));
    assert!(!line.contains("aVerySecretValue"));
}
