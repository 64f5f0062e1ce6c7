//! Thin wrapper for running a runtime CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use tracing::{debug, trace};

use crate::{Result, RuntimeError};

/// A runtime CLI binary plus environment it must always receive.
#[derive(Debug, Clone)]
pub struct CliCommand {
    path: PathBuf,
    envs: Vec<(String, String)>,
}

impl CliCommand {
    /// Use the binary at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            envs: Vec::new(),
        }
    }

    /// Locate `name` in PATH.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::BinaryNotFound` if it is not there.
    pub fn from_path(name: &str) -> Result<Self> {
        let path =
            which::which(name).map_err(|_| RuntimeError::BinaryNotFound(name.to_string()))?;
        debug!(binary = %name, path = %path.display(), "runtime cli found");
        Ok(Self::new(path))
    }

    /// Set an environment variable for every invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd
    }

    fn display(&self, args: &[&str]) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} {}", name, args.join(" "))
    }

    /// Run and return the raw output.
    pub fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(command = %self.display(args), "running runtime command");
        let output = self.command(args).output()?;
        trace!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "runtime command completed"
        );
        Ok(output)
    }

    /// Run and return stdout, failing on a non-zero exit.
    pub fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(RuntimeError::CommandFailed {
                command: self.display(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run with inherited stdio.
    pub fn run_inherited(&self, args: &[String]) -> Result<ExitStatus> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(command = %self.display(&refs), "running runtime command interactively");
        Ok(self.command(&refs).status()?)
    }
}
