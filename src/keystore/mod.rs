// Identity Store
//
// Persistent signing credentials keyed by a derivation policy. A credential
// is generated the first time its key is seen and is never deleted: an
// update to an installed app must be signed with the same key pair.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::tools::{ToolCommand, ToolRunner};

pub mod derivation;
pub mod error;

#[cfg(test)]
mod test_keystore;

pub use derivation::{sanitize_key, KeyDerivation, KeyDerivationPolicy, SigningSubject};
pub use error::{KeystoreError, KeystoreResult};

/// Alias of the single key inside every generated keystore
pub const KEY_ALIAS: &str = "androiddebugkey";
/// Store and key passphrase
pub const KEY_PASSWORD: &str = "android";
/// Distinguished name of the self-signed certificate
pub const DISTINGUISHED_NAME: &str = "CN=Hardening,O=APK,L=Local,C=US";
pub const KEY_ALGORITHM: &str = "RSA";
pub const KEY_SIZE: u32 = 2048;
pub const VALIDITY_DAYS: u32 = 10000;

/// A keystore on disk plus what the signer needs to open it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreCredential {
    pub path: PathBuf,
    pub alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl KeystoreCredential {
    /// Credential for a keystore generated with the fixed alias and passphrase
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            alias: KEY_ALIAS.to_string(),
            store_password: KEY_PASSWORD.to_string(),
            key_password: KEY_PASSWORD.to_string(),
        }
    }
}

/// Creates a new self-signed key pair at a path
#[async_trait]
pub trait KeystoreGenerator: Send + Sync {
    async fn generate(&self, path: &Path) -> KeystoreResult<()>;
}

/// JDK `keytool -genkeypair`
pub struct KeytoolGenerator {
    runner: Arc<dyn ToolRunner>,
    keytool: String,
    timeout: Duration,
}

impl KeytoolGenerator {
    pub fn new(runner: Arc<dyn ToolRunner>, keytool: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            keytool: keytool.into(),
            timeout,
        }
    }
}

#[async_trait]
impl KeystoreGenerator for KeytoolGenerator {
    async fn generate(&self, path: &Path) -> KeystoreResult<()> {
        let command = ToolCommand::new(self.keytool.clone())
            .args(["-genkeypair", "-v", "-keystore"])
            .arg_path(path)
            .args(["-storepass", KEY_PASSWORD, "-keypass", KEY_PASSWORD])
            .args(["-alias", KEY_ALIAS, "-keyalg", KEY_ALGORITHM])
            .args(["-keysize".to_string(), KEY_SIZE.to_string()])
            .args(["-validity".to_string(), VALIDITY_DAYS.to_string()])
            .args(["-dname", DISTINGUISHED_NAME])
            .with_timeout(self.timeout);

        self.runner.run(command).await?;
        Ok(())
    }
}

/// Directory of persistent keystores
pub struct IdentityStore {
    dir: PathBuf,
    derivation: Arc<dyn KeyDerivation>,
    generator: Arc<dyn KeystoreGenerator>,
}

impl IdentityStore {
    /// Create a store rooted at `dir` using `derivation` to name credentials
    pub fn new(dir: PathBuf, derivation: Arc<dyn KeyDerivation>, generator: Arc<dyn KeystoreGenerator>) -> Self {
        Self {
            dir,
            derivation,
            generator,
        }
    }

    /// Directory holding the keystores
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the active derivation policy
    pub fn policy_name(&self) -> &'static str {
        self.derivation.name()
    }

    /// Key the active policy binds `subject` to
    pub fn derivation_key(&self, subject: &SigningSubject<'_>) -> KeystoreResult<String> {
        self.derivation.derive(subject)
    }

    /// Keystore path for an already derived key
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.keystore", key))
    }

    /// Credential bound to `subject`, generating it on first use.
    ///
    /// An existing keystore is returned untouched. Two jobs racing on the
    /// first use of the same key both call the generator; keytool refuses to
    /// overwrite an existing alias, so the loser fails instead of replacing
    /// the winner's key.
    pub async fn credential_for(&self, subject: &SigningSubject<'_>) -> KeystoreResult<KeystoreCredential> {
        let key = self.derivation_key(subject)?;
        let path = self.path_for_key(&key);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| KeystoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| KeystoreError::Io {
                path: path.clone(),
                source,
            })?;

        if exists {
            log::debug!("reusing keystore {} ({} policy)", path.display(), self.policy_name());
        } else {
            log::info!("generating keystore {} ({} policy)", path.display(), self.policy_name());
            self.generator.generate(&path).await?;
            if !path.exists() {
                return Err(KeystoreError::MissingAfterGeneration { path });
            }
        }

        Ok(KeystoreCredential::new(path))
    }
}
