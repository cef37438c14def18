//! Deadline-bound invocation of external command-line tools.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// How many trailing stderr lines are kept in failure messages
const STDERR_TAIL_LINES: usize = 12;

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a tool invocation did not succeed
#[derive(Error, Debug)]
pub enum ToolFailure {
    /// The process could not be started or waited on
    #[error("could not run process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The deadline passed; the process has been killed
    #[error("timed out")]
    TimedOut,

    /// The process exited unsuccessfully
    #[error("{}: {}", exit_reason(.code), stderr_tail(.stderr))]
    Exit { code: Option<i32>, stderr: String },
}

fn exit_reason(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// An external program run with a per-invocation deadline
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
    timeout: Duration,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the program starts and answers `version_flag`
    pub async fn is_available(&self, version_flag: &str) -> bool {
        Command::new(&self.program)
            .arg(version_flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Run the program to completion, killing it if the deadline passes.
    pub async fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Result<ToolOutput, ToolFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        debug!("Running {:?}", cmd.as_std());
        let child = cmd.spawn().map_err(ToolFailure::Spawn)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(ToolFailure::Spawn)?,
            Err(_) => return Err(ToolFailure::TimedOut),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ToolFailure::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}
