//! Credential material and its resolution.
//!
//! The host owns credential storage; the core only sees the resolved
//! `CredentialMaterial` for an opaque id. `MemoryCredentialStore` is the
//! bundled store: filled programmatically or loaded from a JSON file.

pub mod materialize;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{SecretSlice, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::{InvocationError, Result};
use crate::expand::EnvVars;

pub use materialize::{
    append_credentials, append_vault_password_file, escape_percent, prepend_password,
};

/// Resolved secret material. Exactly one variant per credential id.
#[derive(Debug)]
pub enum CredentialMaterial {
    /// SSH private key, one entry per key.
    PrivateKey {
        username: String,
        private_keys: Vec<SecretString>,
        passphrase: Option<SecretString>,
    },
    /// SSH username and password.
    UsernamePassword {
        username: String,
        password: SecretString,
    },
    /// Vault password held as raw bytes (secret file).
    VaultFile { content: SecretSlice<u8> },
    /// Vault password held as text (secret text).
    VaultText { secret: SecretString },
}

impl CredentialMaterial {
    pub fn private_key(
        username: impl Into<String>,
        key: impl Into<String>,
        passphrase: Option<&str>,
    ) -> Self {
        CredentialMaterial::PrivateKey {
            username: username.into(),
            private_keys: vec![SecretString::from(key.into())],
            passphrase: passphrase.map(SecretString::from),
        }
    }

    pub fn username_password(username: impl Into<String>, password: &str) -> Self {
        CredentialMaterial::UsernamePassword {
            username: username.into(),
            password: SecretString::from(password),
        }
    }

    pub fn vault_file(content: Vec<u8>) -> Self {
        CredentialMaterial::VaultFile {
            content: SecretSlice::from(content),
        }
    }

    pub fn vault_text(secret: &str) -> Self {
        CredentialMaterial::VaultText {
            secret: SecretString::from(secret),
        }
    }

    /// Usable for SSH connections (`--private-key` / `-u ... -k`).
    pub fn is_ssh(&self) -> bool {
        matches!(
            self,
            CredentialMaterial::PrivateKey { .. } | CredentialMaterial::UsernamePassword { .. }
        )
    }

    /// Usable as a vault password.
    pub fn is_vault(&self) -> bool {
        matches!(
            self,
            CredentialMaterial::VaultFile { .. } | CredentialMaterial::VaultText { .. }
        )
    }
}

/// Resolution of opaque credential ids, scoped to the current build.
pub trait CredentialStore {
    fn resolve(&self, id: &str) -> Result<Option<CredentialMaterial>>;
}

/// Resolve an optional id. Blank ids mean "no credentials"; a non-blank id
/// the store does not know is a configuration error.
pub fn lookup(
    store: &dyn CredentialStore,
    id: Option<&str>,
    env: &EnvVars,
) -> Result<Option<CredentialMaterial>> {
    let Some(id) = env.expand_non_blank(id) else {
        return Ok(None);
    };
    let id = id.trim();
    match store.resolve(id)? {
        Some(material) => {
            debug!("Resolved credentials '{}'", id);
            Ok(Some(material))
        }
        None => Err(InvocationError::config(format!(
            "Credentials '{}' not found",
            id
        ))),
    }
}

/// Stored form of one credential, as found in a credentials file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRecord {
    PrivateKey {
        username: String,
        private_key: String,
        #[serde(default)]
        passphrase: Option<String>,
    },
    UsernamePassword {
        username: String,
        password: String,
    },
    VaultFile {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        content_path: Option<PathBuf>,
    },
    VaultText {
        secret: String,
    },
}

impl CredentialRecord {
    fn to_material(&self) -> Result<CredentialMaterial> {
        Ok(match self {
            CredentialRecord::PrivateKey {
                username,
                private_key,
                passphrase,
            } => CredentialMaterial::private_key(
                username.clone(),
                private_key.clone(),
                passphrase.as_deref(),
            ),
            CredentialRecord::UsernamePassword { username, password } => {
                CredentialMaterial::username_password(username.clone(), password)
            }
            CredentialRecord::VaultFile {
                content,
                content_path,
            } => match (content, content_path) {
                (Some(content), _) => CredentialMaterial::vault_file(content.as_bytes().to_vec()),
                (None, Some(path)) => CredentialMaterial::vault_file(fs::read(path)?),
                (None, None) => {
                    return Err(InvocationError::credential(
                        "vault_file credentials need either 'content' or 'content_path'",
                    ));
                }
            },
            CredentialRecord::VaultText { secret } => CredentialMaterial::vault_text(secret),
        })
    }
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: HashMap<String, CredentialRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, record: CredentialRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a JSON object mapping ids to credential records.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let records: HashMap<String, CredentialRecord> = serde_json::from_str(&content)?;
        debug!(
            "Loaded {} credential(s) from {:?}",
            records.len(),
            path.as_ref()
        );
        Ok(Self { records })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn resolve(&self, id: &str) -> Result<Option<CredentialMaterial>> {
        self.records.get(id).map(CredentialRecord::to_material).transpose()
    }
}
