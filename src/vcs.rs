//! Version-control collaborator.
//!
//! The workflow only needs two things from git: the staged diff as text and
//! a way to commit with a message file. Both go through a [`ProcessRunner`]
//! so tests never spawn real processes.

use crate::error::{WorkflowError, WorkflowResult};
use anyhow::Result;
use std::path::Path;
use std::process::{Command, ExitStatus, Output};
use tracing::{error, info};

/// Trait for running system processes.
///
/// This abstraction enables testing without spawning real processes.
pub trait ProcessRunner: Send + Sync {
    /// Executes a command and captures its output.
    fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Executes a command attached to the current terminal.
    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;

    /// Checks if a program exists in PATH.
    fn program_exists(&self, program: &str) -> bool;
}

/// Default process runner using std::process::Command.
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        Ok(Command::new(program).args(args).output()?)
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        Ok(Command::new(program).args(args).status()?)
    }

    fn program_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// The operations the workflow needs from version control.
pub trait Vcs {
    /// Returns the staged changes as a unified diff.
    fn staged_diff(&self) -> WorkflowResult<String>;

    /// Commits the staged changes using the message stored in `message_file`.
    fn commit(&self, message_file: &Path) -> WorkflowResult<()>;
}

/// [`Vcs`] backed by the `git` command line.
pub struct GitCli<P = SystemProcessRunner> {
    runner: P,
}

impl GitCli<SystemProcessRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemProcessRunner)
    }
}

impl Default for GitCli<SystemProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProcessRunner> GitCli<P> {
    pub fn with_runner(runner: P) -> Self {
        Self { runner }
    }

    pub fn is_available(&self) -> bool {
        self.runner.program_exists("git")
    }
}

impl<P: ProcessRunner> Vcs for GitCli<P> {
    fn staged_diff(&self) -> WorkflowResult<String> {
        let output = self
            .runner
            .run("git", &["diff", "--cached", "--no-color", "--no-ext-diff"])
            .map_err(|e| WorkflowError::Vcs(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("git diff failed with status {}: {}", output.status, stderr);
            return Err(WorkflowError::Vcs(if stderr.is_empty() {
                format!("git diff exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let diff = String::from_utf8_lossy(&output.stdout).to_string();
        info!("Read staged diff ({} chars)", diff.len());
        Ok(diff)
    }

    fn commit(&self, message_file: &Path) -> WorkflowResult<()> {
        let path = message_file.to_string_lossy();
        info!("Running git commit -F {}", path);
        let status = self
            .runner
            .run_interactive("git", &["commit", "-F", &*path])
            .map_err(|e| WorkflowError::CommitFailed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            error!("git commit failed with status: {}", status);
            Err(WorkflowError::CommitFailed(format!("git commit exited with {}", status)))
        }
    }
}
