// Tool runner trait and the direct process executor

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use super::error::{ToolError, ToolResult};

/// A single external tool invocation.
///
/// There is deliberately no shell mode: `program` is executed directly and
/// each entry of `args` reaches it as one argv element, so caller-influenced
/// values (URLs, file names) can never be interpreted as shell syntax.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub timeout: Duration,
}

impl ToolCommand {
    /// Create a new command with a one minute timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value following `flag` in the argument list, if any
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|pos| self.args.get(pos + 1))
            .map(String::as_str)
    }

    /// Human readable rendering for logs
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            if arg.contains(char::is_whitespace) {
                rendered.push_str(&format!("{:?}", arg));
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }
}

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
}

impl ToolOutput {
    /// Stdout followed by stderr, the way tool logs are reported
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Runs external tools
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit status or an expired timeout is an error; the error
    /// carries whatever the process printed.
    async fn run(&self, command: ToolCommand) -> ToolResult<ToolOutput>;
}

/// Executes tools as child processes via `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: ToolCommand) -> ToolResult<ToolOutput> {
        let start = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if let Some(ref dir) = command.working_directory {
            cmd.current_dir(dir);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        // Dropping the wait future on timeout must not leave the child running.
        cmd.kill_on_drop(true);

        log::debug!("running {}", command.display());

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let output = timeout(command.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                program: command.program.clone(),
                timeout: command.timeout,
            })??;

        let result = ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            execution_time: start.elapsed(),
        };

        log::debug!(
            "{} exited with {} after {:?}",
            command.program,
            result.exit_code,
            result.execution_time
        );

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: command.program,
                code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}
