// zipalign and apksigner wrappers

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::error::{ToolError, ToolResult};
use super::executor::{ToolCommand, ToolRunner};
use crate::keystore::KeystoreCredential;

/// Aligns archive entries on 4-byte boundaries
#[async_trait]
pub trait Aligner: Send + Sync {
    async fn align(&self, input: &Path, output: &Path) -> ToolResult<()>;
}

/// Signs an aligned archive with a keystore credential
#[async_trait]
pub trait ApkSigner: Send + Sync {
    async fn sign(&self, input: &Path, output: &Path, credential: &KeystoreCredential) -> ToolResult<()>;
}

/// Android build-tools signing chain
pub struct SigningTools {
    runner: Arc<dyn ToolRunner>,
    zipalign: String,
    apksigner: String,
    /// Run apksigner as `java -jar <apksigner>` instead of as a wrapper script
    signer_is_jar: bool,
    java: String,
    timeout: Duration,
}

impl SigningTools {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        zipalign: impl Into<String>,
        apksigner: impl Into<String>,
        signer_is_jar: bool,
        java: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            zipalign: zipalign.into(),
            apksigner: apksigner.into(),
            signer_is_jar,
            java: java.into(),
            timeout,
        }
    }

    fn signer_command(&self) -> ToolCommand {
        let command = if self.signer_is_jar {
            ToolCommand::new(self.java.clone()).arg("-jar").arg(self.apksigner.clone())
        } else {
            ToolCommand::new(self.apksigner.clone())
        };
        command.with_timeout(self.timeout)
    }
}

#[async_trait]
impl Aligner for SigningTools {
    async fn align(&self, input: &Path, output: &Path) -> ToolResult<()> {
        let command = ToolCommand::new(self.zipalign.clone())
            .args(["-f", "4"])
            .arg_path(input)
            .arg_path(output)
            .with_timeout(self.timeout);

        let log = self.runner.run(command).await?.combined();
        if !output.exists() {
            return Err(ToolError::MissingOutput {
                tool: "zipalign".to_string(),
                path: output.to_path_buf(),
                output: log,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApkSigner for SigningTools {
    async fn sign(&self, input: &Path, output: &Path, credential: &KeystoreCredential) -> ToolResult<()> {
        let command = self
            .signer_command()
            .arg("sign")
            .arg("--ks")
            .arg_path(&credential.path)
            .args(["--ks-key-alias", credential.alias.as_str()])
            .args(["--ks-pass".to_string(), format!("pass:{}", credential.store_password)])
            .args(["--key-pass".to_string(), format!("pass:{}", credential.key_password)])
            .arg("--out")
            .arg_path(output)
            .arg_path(input);

        let log = self.runner.run(command).await?.combined();
        if !output.exists() {
            return Err(ToolError::MissingOutput {
                tool: "apksigner".to_string(),
                path: output.to_path_buf(),
                output: log,
            });
        }
        Ok(())
    }
}
