// Keystore key derivation policies

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::error::{KeystoreError, KeystoreResult};

/// Inputs a derivation policy may bind a credential to
#[derive(Debug, Clone, Copy)]
pub struct SigningSubject<'a> {
    /// Final package identity of the hardened archive
    pub package: &'a str,
    /// Caller-chosen output base name
    pub file_name: &'a str,
    /// Caller correlation id
    pub correlation_id: &'a str,
}

/// Maps a signing subject to the stable key its credential is stored under.
///
/// Whatever a policy returns for one logical application must be returned
/// again on every later hardening of it, otherwise devices reject the update
/// as a signature mismatch.
pub trait KeyDerivation: Send + Sync + fmt::Debug {
    /// Short policy name for logs
    fn name(&self) -> &'static str;

    /// Raw, unsanitised key for `subject`
    fn derive_raw(&self, subject: &SigningSubject<'_>) -> String;

    /// Filesystem-safe key for `subject`
    fn derive(&self, subject: &SigningSubject<'_>) -> KeystoreResult<String> {
        let key = sanitize_key(&self.derive_raw(subject));
        if key.is_empty() {
            return Err(KeystoreError::InvalidKey(format!(
                "{} policy produced an empty key",
                self.name()
            )));
        }
        Ok(key)
    }
}

/// Built-in derivation policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyDerivationPolicy {
    /// Bind to the final package name; supports update-in-place but collides
    /// across callers that reuse generated names
    Package,
    /// First 16 hex chars of SHA-256 over the final package name
    PackageHash,
    /// Bind to `{file_name}_{correlation_id}`
    #[default]
    FileAndId,
}

impl KeyDerivation for KeyDerivationPolicy {
    fn name(&self) -> &'static str {
        match self {
            KeyDerivationPolicy::Package => "package",
            KeyDerivationPolicy::PackageHash => "package-hash",
            KeyDerivationPolicy::FileAndId => "file-and-id",
        }
    }

    fn derive_raw(&self, subject: &SigningSubject<'_>) -> String {
        match self {
            KeyDerivationPolicy::Package => subject.package.to_string(),
            KeyDerivationPolicy::PackageHash => {
                let digest = Sha256::digest(subject.package.as_bytes());
                hex::encode(digest)[..16].to_string()
            }
            KeyDerivationPolicy::FileAndId => {
                format!("{}_{}", subject.file_name, subject.correlation_id)
            }
        }
    }
}

impl FromStr for KeyDerivationPolicy {
    type Err = KeystoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "package" => Ok(KeyDerivationPolicy::Package),
            "package-hash" | "package_hash" => Ok(KeyDerivationPolicy::PackageHash),
            "file-and-id" | "file_and_id" => Ok(KeyDerivationPolicy::FileAndId),
            other => Err(KeystoreError::InvalidKey(format!("unknown key derivation policy '{}'", other))),
        }
    }
}

/// Separates a sanitised key from the digest of its raw form. Never part of
/// a key that needed no substitution.
pub const DIGEST_SEPARATOR: char = '~';

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Map a raw key onto a filesystem-safe file stem, refusing dot-only keys.
///
/// Keys that are already safe pass through unchanged. Any other key has its
/// unsafe characters replaced with `_` and gets `~` plus 16 hex chars of the
/// raw key's SHA-256 appended, so two different raw keys never share a file.
pub fn sanitize_key(raw: &str) -> String {
    if !raw.is_empty() && raw.chars().all(is_key_char) {
        return if raw.chars().all(|c| c == '.') { String::new() } else { raw.to_string() };
    }

    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("{}{}{}", cleaned, DIGEST_SEPARATOR, &digest[..16])
}
