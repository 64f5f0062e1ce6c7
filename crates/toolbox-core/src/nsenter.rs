//! Running programs inside a container's namespaces with nsenter.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use tracing::debug;

use crate::{Result, ToolboxError};

/// Namespaces nsenter can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Mount,
    Uts,
    Ipc,
    Net,
    Pid,
}

impl Namespace {
    fn flag(self) -> &'static str {
        match self {
            Namespace::Mount => "--mount",
            Namespace::Uts => "--uts",
            Namespace::Ipc => "--ipc",
            Namespace::Net => "--net",
            Namespace::Pid => "--pid",
        }
    }
}

/// Namespaces joined by `shell`: the host mount namespace is kept so host
/// tools stay usable.
pub const SHELL_NAMESPACES: &[Namespace] =
    &[Namespace::Uts, Namespace::Ipc, Namespace::Net, Namespace::Pid];

/// Namespaces joined to run a program from the container's filesystem.
pub const EXEC_NAMESPACES: &[Namespace] = &[Namespace::Mount, Namespace::Pid];

/// nsenter bound to a target process.
#[derive(Debug, Clone)]
pub struct Nsenter {
    binary: PathBuf,
    target: i32,
}

impl Nsenter {
    pub fn new(binary: impl Into<PathBuf>, target: i32) -> Self {
        Self {
            binary: binary.into(),
            target,
        }
    }

    /// Arguments for running `program args...` in `namespaces`.
    pub fn args(&self, namespaces: &[Namespace], program: &str, args: &[String]) -> Vec<String> {
        let mut out = vec!["--target".to_string(), self.target.to_string()];
        out.extend(namespaces.iter().map(|n| n.flag().to_string()));
        out.push("--".to_string());
        out.push(program.to_string());
        out.extend(args.iter().cloned());
        out
    }

    fn command(&self, namespaces: &[Namespace], program: &str, args: &[String]) -> Command {
        let argv = self.args(namespaces, program, args);
        debug!(nsenter = %self.binary.display(), args = ?argv, "running nsenter");
        let mut cmd = Command::new(&self.binary);
        cmd.args(argv);
        cmd
    }

    /// Run with inherited stdio, optionally from `cwd`.
    pub fn run_inherited(
        &self,
        namespaces: &[Namespace],
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ExitStatus> {
        let mut cmd = self.command(namespaces, program, args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        Ok(cmd.status()?)
    }

    /// Run and capture output, failing on a non-zero exit.
    pub fn run(&self, namespaces: &[Namespace], program: &str, args: &[String]) -> Result<Output> {
        let output = self.command(namespaces, program, args).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(ToolboxError::CommandFailed {
                command: format!("nsenter -t {} {} {}", self.target, program, args.join(" ")),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
