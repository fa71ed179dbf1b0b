// apktool wrapper: archive <-> source tree

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::error::{ToolError, ToolResult};
use super::executor::{ToolCommand, ToolRunner};
use crate::manifest::MANIFEST_FILE;

/// Markers apktool prints when decoding went wrong even on a zero exit code
const ERROR_TOKENS: &[&str] = &["ERROR", "Exception"];

/// Turns a compiled archive into an editable source tree
#[async_trait]
pub trait Disassembler: Send + Sync {
    /// Decode `apk` into `out_dir`, returning the tool log
    async fn disassemble(&self, apk: &Path, out_dir: &Path) -> ToolResult<String>;
}

/// Turns a source tree back into an archive
#[async_trait]
pub trait Assembler: Send + Sync {
    /// Build `src_dir` into `out_apk`, returning the tool log
    async fn assemble(&self, src_dir: &Path, out_apk: &Path) -> ToolResult<String>;
}

/// `java -jar apktool.jar` driven through a [`ToolRunner`]
pub struct ApkTool {
    runner: Arc<dyn ToolRunner>,
    java: String,
    jar: PathBuf,
    timeout: Duration,
}

impl ApkTool {
    /// Create a new apktool wrapper
    pub fn new(runner: Arc<dyn ToolRunner>, java: impl Into<String>, jar: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            java: java.into(),
            jar,
            timeout,
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(self.java.clone())
            .arg("-jar")
            .arg_path(&self.jar)
            .with_timeout(self.timeout)
    }
}

/// Whether apktool output contains one of its error markers
pub fn reports_error(output: &str) -> bool {
    ERROR_TOKENS.iter().any(|token| output.contains(token))
}

#[async_trait]
impl Disassembler for ApkTool {
    async fn disassemble(&self, apk: &Path, out_dir: &Path) -> ToolResult<String> {
        let command = self
            .command()
            .arg("d")
            .arg_path(apk)
            .arg("-o")
            .arg_path(out_dir)
            .arg("--force");

        let log = self.runner.run(command).await?.combined();
        if reports_error(&log) {
            return Err(ToolError::Reported {
                tool: "apktool".to_string(),
                output: log,
            });
        }

        let manifest = out_dir.join(MANIFEST_FILE);
        if !manifest.exists() {
            return Err(ToolError::MissingOutput {
                tool: "apktool".to_string(),
                path: manifest,
                output: log,
            });
        }

        Ok(log)
    }
}

#[async_trait]
impl Assembler for ApkTool {
    async fn assemble(&self, src_dir: &Path, out_apk: &Path) -> ToolResult<String> {
        let command = self
            .command()
            .arg("b")
            .arg_path(src_dir)
            .arg("-o")
            .arg_path(out_apk);

        let log = self.runner.run(command).await?.combined();
        if !out_apk.exists() {
            return Err(ToolError::MissingOutput {
                tool: "apktool".to_string(),
                path: out_apk.to_path_buf(),
                output: log,
            });
        }

        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use std::sync::Mutex;

    /// Records commands and prints a canned log without touching the disk
    struct CannedRunner {
        stdout: String,
        seen: Mutex<Vec<ToolCommand>>,
    }

    #[async_trait]
    impl ToolRunner for CannedRunner {
        async fn run(&self, command: ToolCommand) -> ToolResult<ToolOutput> {
            self.seen.lock().unwrap().push(command);
            Ok(ToolOutput {
                stdout: self.stdout.clone(),
                ..ToolOutput::default()
            })
        }
    }

    fn apktool(stdout: &str) -> (Arc<CannedRunner>, ApkTool) {
        let runner = Arc::new(CannedRunner {
            stdout: stdout.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let tool = ApkTool::new(runner.clone(), "java", PathBuf::from("/opt/apktool.jar"), Duration::from_secs(5));
        (runner, tool)
    }

    #[test]
    fn test_reports_error() {
        assert!(reports_error("I: Using Apktool\nException in thread \"main\""));
        assert!(reports_error("W: something\nERROR: failed"));
        assert!(!reports_error("I: Decoding AndroidManifest.xml with resources..."));
    }

    #[tokio::test]
    async fn test_disassemble_builds_argument_vector() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "<manifest/>").unwrap();
        let (runner, tool) = apktool("I: Baksmaling classes.dex...");

        tool.disassemble(Path::new("/tmp/in put.apk"), dir.path()).await.unwrap();

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0].program, "java");
        assert_eq!(seen[0].args[0..4], ["-jar", "/opt/apktool.jar", "d", "/tmp/in put.apk"]);
        assert_eq!(seen[0].args.last().map(String::as_str), Some("--force"));
    }

    #[tokio::test]
    async fn test_disassemble_error_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "<manifest/>").unwrap();
        let (_, tool) = apktool("brut.androlib.AndrolibException: Could not decode arsc file");

        let err = tool.disassemble(Path::new("in.apk"), dir.path()).await.unwrap_err();
        assert!(matches!(err, ToolError::Reported { .. }));
    }

    #[tokio::test]
    async fn test_disassemble_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_, tool) = apktool("I: done");

        let err = tool.disassemble(Path::new("in.apk"), dir.path()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_assemble_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_, tool) = apktool("I: Building apk file...");

        let err = tool
            .assemble(dir.path(), &dir.path().join("rebuilt.apk"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Building apk file"));
    }
}
