// Source archive retrieval

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::error::{ToolError, ToolResult};
use super::executor::{ToolCommand, ToolRunner};

/// Downloads a locator into a local file
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch `url` into `dest` and return the number of bytes written.
    ///
    /// Any non-2xx outcome or an empty body is an error; a truncated file is
    /// never reported as success.
    async fn retrieve(&self, url: &Url, dest: &Path) -> ToolResult<u64>;
}

/// curl-based retriever
pub struct CurlRetriever {
    runner: Arc<dyn ToolRunner>,
    curl: String,
    connect_timeout_secs: u64,
    timeout: Duration,
}

impl CurlRetriever {
    pub fn new(runner: Arc<dyn ToolRunner>, curl: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            curl: curl.into(),
            connect_timeout_secs: 30,
            timeout,
        }
    }
}

#[async_trait]
impl Retriever for CurlRetriever {
    async fn retrieve(&self, url: &Url, dest: &Path) -> ToolResult<u64> {
        // --url keeps a locator starting with '-' from being read as an option
        let command = ToolCommand::new(self.curl.clone())
            .args(["-L", "--fail", "--silent", "--show-error"])
            .args(["--connect-timeout".to_string(), self.connect_timeout_secs.to_string()])
            .args(["--url", url.as_str()])
            .arg("-o")
            .arg_path(dest)
            .with_timeout(self.timeout);

        self.runner.run(command).await?;

        let size = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(ToolError::MissingOutput {
                    tool: "curl".to_string(),
                    path: dest.to_path_buf(),
                    output: String::new(),
                })
            }
        };
        if size == 0 {
            return Err(ToolError::EmptyOutput {
                tool: "curl".to_string(),
                path: dest.to_path_buf(),
            });
        }

        log::debug!("retrieved {} bytes from {}", size, url);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;

    struct WritingRunner(&'static [u8]);

    #[async_trait]
    impl ToolRunner for WritingRunner {
        async fn run(&self, command: ToolCommand) -> ToolResult<ToolOutput> {
            assert_eq!(command.flag_value("--url"), Some("https://cdn.example.com/app.apk"));
            let out = command.flag_value("-o").unwrap();
            std::fs::write(out, self.0)?;
            Ok(ToolOutput::default())
        }
    }

    #[tokio::test]
    async fn test_retrieve_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = CurlRetriever::new(Arc::new(WritingRunner(b"PK\x03\x04")), "curl", Duration::from_secs(5));
        let url = Url::parse("https://cdn.example.com/app.apk").unwrap();

        let size = retriever.retrieve(&url, &dir.path().join("source.apk")).await.unwrap();
        assert_eq!(size, 4);
    }

    #[tokio::test]
    async fn test_zero_byte_download_fails() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = CurlRetriever::new(Arc::new(WritingRunner(b"")), "curl", Duration::from_secs(5));
        let url = Url::parse("https://cdn.example.com/app.apk").unwrap();

        let err = retriever.retrieve(&url, &dir.path().join("source.apk")).await.unwrap_err();
        assert!(matches!(err, ToolError::EmptyOutput { .. }));
    }
}
