//! Locating the Ansible executables.
//!
//! The invocation core only ever receives a resolved executable path; this
//! module is the host-side lookup used by step files and the CLI.

use std::path::{Path, PathBuf};

use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::debug;

use crate::error::{InvocationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum AnsibleCommand {
    #[strum(serialize = "ansible")]
    Ansible,
    #[strum(serialize = "ansible-playbook")]
    AnsiblePlaybook,
    #[strum(serialize = "ansible-vault")]
    AnsibleVault,
}

/// A named Ansible installation. Without a home directory the commands
/// are looked up on `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnsibleInstallation {
    pub name: String,
    pub home: Option<PathBuf>,
}

impl AnsibleInstallation {
    pub fn new(name: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home,
        }
    }

    /// Installation that relies on `PATH`.
    pub fn system() -> Self {
        Self::new("system", None)
    }

    /// Resolve the executable for `command`.
    pub fn executable(&self, command: AnsibleCommand) -> Result<PathBuf> {
        let found = match &self.home {
            Some(home) => Some(home.join(command.as_ref())).filter(|p| p.is_file()),
            None => std::env::var_os("PATH")
                .and_then(|path| find_on_path(command.as_ref(), &path)),
        };

        match found {
            Some(path) => {
                debug!("Using {} at {:?}", command, path);
                Ok(path)
            }
            None => Err(InvocationError::config(
                "Ansible executable not found, check your installation.",
            )),
        }
    }
}

fn find_on_path(name: &str, path: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use strum::IntoEnumIterator;

    #[test]
    fn test_command_names() {
        let names: Vec<String> = AnsibleCommand::iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["ansible", "ansible-playbook", "ansible-vault"]);
    }

    #[test]
    fn test_home_lookup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exe = dir.path().join("ansible-playbook");
        fs::write(&exe, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).expect("chmod");

        let install = AnsibleInstallation::new("local", Some(dir.path().to_path_buf()));
        assert_eq!(
            install.executable(AnsibleCommand::AnsiblePlaybook).expect("found"),
            exe
        );
        let err = install.executable(AnsibleCommand::AnsibleVault).unwrap_err();
        assert!(err.to_string().contains("check your installation"));
    }

    #[test]
    fn test_path_lookup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exe = dir.path().join("ansible");
        fs::write(&exe, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).expect("chmod");

        let path = std::env::join_paths([Path::new("/nonexistent"), dir.path()]).expect("join");
        assert_eq!(find_on_path("ansible", &path), Some(exe));
        assert_eq!(find_on_path("ansible-vault", &path), None);
    }
}
