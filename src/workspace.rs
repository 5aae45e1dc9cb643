//! Build workspace and temporary artifact management.
//!
//! # Security Model
//!
//! Credentials are NEVER passed to the tool as clear-text arguments when a
//! file can carry them instead. Private keys, vault passwords and inline
//! inventories are written to uniquely named files in the build's temp
//! directory with restricted permissions, and every such file is registered
//! with an `ArtifactLedger` the moment it exists. The ledger deletes what it
//! holds exactly once: explicitly at teardown, or on drop if a panic unwinds
//! past the invocation.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use strum::Display;
use tracing::{debug, warn};

use crate::error::{InvocationError, Result};

/// Result of deleting a file.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(std::io::Error),
}

/// File operations of the build workspace, possibly on a remote agent.
pub trait Workspace: Send + Sync {
    /// Working directory of the tool.
    fn root(&self) -> &Path;

    /// Directory used for temporary files when no override is given.
    fn temp_dir(&self) -> &Path;

    /// Create a uniquely named file in `dir` (or `temp_dir()`) holding
    /// `content`, returning its path.
    fn create_temp_file(
        &self,
        dir: Option<&Path>,
        prefix: &str,
        suffix: &str,
        content: &[u8],
    ) -> std::io::Result<PathBuf>;

    fn set_mode(&self, path: &Path, mode: u32) -> std::io::Result<()>;

    fn delete(&self, path: &Path) -> DeleteOutcome;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Workspace on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    temp_dir: PathBuf,
}

impl LocalWorkspace {
    /// Workspace rooted at `root`, with temp files in the sibling `<root>@tmp`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut temp_name = root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "workspace".into());
        temp_name.push("@tmp");
        let temp_dir = root.with_file_name(temp_name);
        Self { root, temp_dir }
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn create_temp_file(
        &self,
        dir: Option<&Path>,
        prefix: &str,
        suffix: &str,
        content: &[u8],
    ) -> std::io::Result<PathBuf> {
        let dir = dir.unwrap_or(self.temp_dir.as_path());
        fs::create_dir_all(dir)?;

        // tempfile creates the file with 0600 and O_EXCL
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?;
        file.write_all(content)?;
        file.as_file().sync_all()?;

        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn delete(&self, path: &Path) -> DeleteOutcome {
        match fs::remove_file(path) {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DeleteOutcome::NotFound,
            Err(e) => DeleteOutcome::Failed(e),
        }
    }
}

/// What a temporary artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArtifactKind {
    #[strum(serialize = "private key file")]
    PrivateKey,
    #[strum(serialize = "askpass script")]
    AskPass,
    #[strum(serialize = "vault password file")]
    VaultPassword,
    #[strum(serialize = "new vault password file")]
    NewVaultPassword,
    #[strum(serialize = "inventory file")]
    Inventory,
}

impl ArtifactKind {
    fn name_parts(self) -> (&'static str, &'static str) {
        match self {
            ArtifactKind::PrivateKey => ("ssh", "key"),
            ArtifactKind::AskPass => ("ssh", "askpass"),
            ArtifactKind::VaultPassword | ArtifactKind::NewVaultPassword => ("vault", "password"),
            ArtifactKind::Inventory => ("inventory", ".ini"),
        }
    }
}

/// A file created for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    pub path: PathBuf,
    pub mode: u32,
    pub kind: ArtifactKind,
}

/// Owner of every temp artifact created during one `execute` call.
pub struct ArtifactLedger<'w> {
    workspace: &'w dyn Workspace,
    artifacts: Vec<TempArtifact>,
    torn_down: bool,
}

impl<'w> ArtifactLedger<'w> {
    pub fn new(workspace: &'w dyn Workspace) -> Self {
        Self {
            workspace,
            artifacts: Vec::new(),
            torn_down: false,
        }
    }

    pub fn artifacts(&self) -> &[TempArtifact] {
        &self.artifacts
    }

    /// Create a file holding `content`, register it, then restrict it to
    /// `mode`. The file is registered before the chmod so a failed chmod
    /// still leaves it in the ledger for teardown.
    pub fn create(
        &mut self,
        kind: ArtifactKind,
        mode: u32,
        dir: Option<&Path>,
        content: &[u8],
    ) -> Result<PathBuf> {
        let (prefix, suffix) = kind.name_parts();
        let path = self
            .workspace
            .create_temp_file(dir, prefix, suffix, content)
            .map_err(|e| InvocationError::materialization(kind.to_string(), e))?;
        self.artifacts.push(TempArtifact {
            path: path.clone(),
            mode,
            kind,
        });

        self.workspace
            .set_mode(&path, mode)
            .map_err(|e| InvocationError::materialization(kind.to_string(), e))?;

        debug!("Created {} {:?} (mode {:o})", kind, path, mode);
        Ok(path)
    }

    /// Delete every registered artifact. Returns the warnings for files
    /// that could not be removed and still exist.
    pub fn tear_down(&mut self) -> Vec<String> {
        self.torn_down = true;
        let mut warnings = Vec::new();

        for artifact in self.artifacts.drain(..) {
            match self.workspace.delete(&artifact.path) {
                DeleteOutcome::Deleted => {
                    debug!("Deleted {} {:?}", artifact.kind, artifact.path);
                }
                DeleteOutcome::NotFound => {
                    debug!("{} {:?} already gone", artifact.kind, artifact.path);
                }
                DeleteOutcome::Failed(e) => {
                    if self.workspace.exists(&artifact.path) {
                        let message = format!(
                            "temp file {} not deleted: {}",
                            artifact.path.display(),
                            e
                        );
                        warn!("{}", message);
                        warnings.push(message);
                    } else {
                        debug!("{} {:?} vanished during delete", artifact.kind, artifact.path);
                    }
                }
            }
        }
        warnings
    }
}

impl Drop for ArtifactLedger<'_> {
    fn drop(&mut self) {
        if !self.torn_down {
            self.tear_down();
        }
    }
}
