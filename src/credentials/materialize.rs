//! Turning credential material into arguments, environment entries and
//! restricted temp files.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::ExposeSecret;

use super::CredentialMaterial;
use crate::args::{ArgumentList, escape_single_quote_content};
use crate::error::{InvocationError, Result};
use crate::workspace::{ArtifactKind, ArtifactLedger};

pub const PRIVATE_KEY_MODE: u32 = 0o400;
pub const ASKPASS_MODE: u32 = 0o700;
pub const VAULT_PASSWORD_MODE: u32 = 0o400;

/// Dummy display so ssh consults SSH_ASKPASS without a terminal.
const DISPLAY_PLACEHOLDER: &str = ":123.456";

/// Render a path for the tool's arguments. The tool treats `%` as an
/// interpolation character, so it is doubled.
pub fn escape_percent(path: &Path) -> String {
    path.display().to_string().replace('%', "%%")
}

/// Prefix the command with `sshpass -p<password>` for username/password
/// credentials. The password token is masked. Other material adds nothing.
pub fn prepend_password(credentials: Option<&CredentialMaterial>, args: &mut ArgumentList) {
    if let Some(CredentialMaterial::UsernamePassword { password, .. }) = credentials {
        args.add("sshpass")
            .add_masked(format!("-p{}", password.expose_secret()));
    }
}

/// Append the SSH connection arguments for `credentials`.
///
/// A private key is written to a 0400 temp file and passed as
/// `--private-key`; a passphrase additionally produces a 0700 askpass
/// script exported through `SSH_ASKPASS`. Username/password credentials
/// contribute `-u <user> -k`.
pub fn append_credentials(
    credentials: Option<&CredentialMaterial>,
    args: &mut ArgumentList,
    environment: &mut BTreeMap<String, String>,
    ledger: &mut ArtifactLedger<'_>,
) -> Result<()> {
    let Some(credentials) = credentials else {
        return Ok(());
    };

    match credentials {
        CredentialMaterial::PrivateKey {
            username,
            private_keys,
            passphrase,
        } => {
            let mut content = String::new();
            for key in private_keys {
                content.push_str(key.expose_secret());
                content.push('\n');
            }
            let key_path = ledger.create(
                ArtifactKind::PrivateKey,
                PRIVATE_KEY_MODE,
                None,
                content.as_bytes(),
            )?;
            args.add_option("--private-key", escape_percent(&key_path));
            args.add_option("-u", username.clone());

            if let Some(passphrase) = passphrase {
                let script = format!(
                    "#!/bin/sh\necho '{}'\n",
                    escape_single_quote_content(passphrase.expose_secret())
                );
                let askpass =
                    ledger.create(ArtifactKind::AskPass, ASKPASS_MODE, None, script.as_bytes())?;
                environment.insert("SSH_ASKPASS".into(), askpass.display().to_string());
                if !environment.contains_key("DISPLAY") {
                    environment.insert("DISPLAY".into(), DISPLAY_PLACEHOLDER.into());
                }
            }
        }
        CredentialMaterial::UsernamePassword { username, .. } => {
            args.add_option("-u", username.clone()).add("-k");
        }
        CredentialMaterial::VaultFile { .. } | CredentialMaterial::VaultText { .. } => {
            return Err(InvocationError::config(
                "vault credentials cannot be used as SSH credentials",
            ));
        }
    }
    Ok(())
}

/// Write the vault password to a 0400 file and append `flag <path>`.
/// `dir` overrides the workspace temp directory when set.
pub fn append_vault_password_file(
    credentials: Option<&CredentialMaterial>,
    flag: &str,
    kind: ArtifactKind,
    dir: Option<&Path>,
    args: &mut ArgumentList,
    ledger: &mut ArtifactLedger<'_>,
) -> Result<()> {
    let Some(credentials) = credentials else {
        return Ok(());
    };

    let path = match credentials {
        CredentialMaterial::VaultFile { content } => {
            ledger.create(kind, VAULT_PASSWORD_MODE, dir, content.expose_secret())?
        }
        CredentialMaterial::VaultText { secret } => ledger.create(
            kind,
            VAULT_PASSWORD_MODE,
            dir,
            secret.expose_secret().as_bytes(),
        )?,
        CredentialMaterial::PrivateKey { .. } | CredentialMaterial::UsernamePassword { .. } => {
            return Err(InvocationError::config(
                "SSH credentials cannot be used as a vault password",
            ));
        }
    };
    args.add_option(flag, escape_percent(&path));
    Ok(())
}
