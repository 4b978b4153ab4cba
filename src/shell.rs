//! External process execution.
//!
//! The controller CLI and Terraform are both driven as child processes with
//! captured output. Execution is argv-based; no shell interpretation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command succeeded (exit code 0).
    pub success: bool,
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with the parent environment).
    pub env: HashMap<String, String>,
}

/// Execute a program with arguments, capturing output.
pub fn execute(
    program: &str,
    args: &[&str],
    options: &CommandOptions,
) -> std::io::Result<CommandResult> {
    let start = Instant::now();
    debug!("executing {} {:?}", program, args);

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output()?;
    let duration = start.elapsed();

    let result = CommandResult {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration,
        success: output.status.success(),
    };
    debug!(
        "{} exited with {:?} in {:?}",
        program, result.exit_code, result.duration
    );
    Ok(result)
}
