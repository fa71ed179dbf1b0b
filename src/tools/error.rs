use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for external tool invocations
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Failures raised while running an external tool
#[derive(Error, Debug)]
pub enum ToolError {
    /// The executable could not be started at all
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process exceeded its per-call time budget and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The process exited unsuccessfully
    #[error("{program} exited with code {code}\nSTDOUT:{stdout}\nSTDERR:{stderr}")]
    Failed {
        program: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The process exited cleanly but printed an error marker
    #[error("{tool} reported an error\n{output}")]
    Reported { tool: String, output: String },

    /// The expected artifact was not produced
    #[error("{tool} produced no output at {}\n{output}", path.display())]
    MissingOutput {
        tool: String,
        path: PathBuf,
        output: String,
    },

    /// The artifact exists but is empty
    #[error("{tool} produced an empty file at {}", path.display())]
    EmptyOutput { tool: String, path: PathBuf },

    /// Filesystem error around a tool invocation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ToolError {
    /// Whether the failure was caused by the per-call timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}
