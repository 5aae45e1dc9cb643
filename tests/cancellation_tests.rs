//! Cancellation tests
//!
//! The cancellation flag is process-wide, so everything that sets it lives
//! in this one test binary and runs in a single test function.
//!
//! These tests verify:
//! - A step cancelled before launch never starts the tool
//! - Its temp artifacts are still removed
//! - A child spawned just before the cancel is killed at registration
//! - Clearing the flag lets later runs launch again

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use ansible_step::{
    AdHocCommand, CommandProcessGroup, CredentialMaterial, EnvVars, Invocation, InvocationConfig,
    InvocationError, LocalProcessRunner, LocalWorkspace, process_guard,
};

fn touching_tool(dir: &Path) -> std::path::PathBuf {
    let exe = dir.join("ansible");
    fs::write(&exe, "#!/bin/sh\ntouch \"$MARKER\"\n").expect("write");
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).expect("chmod");
    exe
}

fn config(exe: &Path, marker: &Path) -> InvocationConfig {
    let env: EnvVars = [
        ("PATH", "/usr/bin:/bin"),
        ("MARKER", marker.to_str().expect("utf8 path")),
    ]
    .into_iter()
    .collect();
    InvocationConfig::builder(exe, AdHocCommand::new("all"))
        .with_credentials(Some(CredentialMaterial::private_key("deploy", "KEYDATA", None)))
        .with_env(env)
        .build()
        .expect("config")
}

#[test]
fn test_cancellation_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = touching_tool(dir.path());
    let marker = dir.path().join("ran");
    let root = dir.path().join("job");
    fs::create_dir_all(&root).expect("mkdir");
    let ws = LocalWorkspace::new(&root);

    process_guard::cancel(15, Duration::from_millis(10));

    // Cancelled before launch: the tool never runs, artifacts are removed.
    let started = Instant::now();
    let mut runner = LocalProcessRunner::new(Vec::new());
    let mut invocation = Invocation::new(config(&exe, &marker), &ws);
    let err = invocation.execute(&mut runner).unwrap_err();
    assert!(matches!(err, InvocationError::Cancelled { signal: 15 }));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!marker.exists());
    assert!(runner.into_sink().is_empty());
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("job@tmp"))
        .expect("temp dir")
        .collect();
    assert!(leftovers.is_empty());

    // Spawned before registration: killed instead of tracked.
    let mut child = Command::new("sleep")
        .arg("30")
        .in_new_process_group()
        .spawn()
        .expect("spawn sleep");
    assert_eq!(process_guard::track_child(child.id()), Some(15));
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut reaped = false;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            reaped = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(reaped);

    // Cleared: the next run launches normally.
    process_guard::reset_cancellation();
    assert_eq!(process_guard::cancellation_signal(), None);
    let mut runner = LocalProcessRunner::new(Vec::new());
    let mut invocation = Invocation::new(config(&exe, &marker), &ws);
    assert!(invocation.execute(&mut runner).expect("execute"));
    assert!(marker.exists());
}
