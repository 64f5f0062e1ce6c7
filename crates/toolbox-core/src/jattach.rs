//! jattach invocations: thread dumps, heap dumps and jcmd.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use tracing::{debug, trace};

use crate::{Result, ToolboxError};

/// A jattach binary.
#[derive(Debug, Clone)]
pub struct Jattach {
    binary: PathBuf,
}

impl Jattach {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, pid: i32, args: &[&str]) -> Command {
        debug!(pid, args = ?args, "running jattach");
        let mut cmd = Command::new(&self.binary);
        cmd.arg(pid.to_string()).args(args);
        cmd
    }

    /// Run and capture output, failing on a non-zero exit.
    pub fn run(&self, pid: i32, args: &[&str]) -> Result<Output> {
        let output = self.command(pid, args).output()?;
        trace!(status = %output.status, stdout_len = output.stdout.len(), "jattach completed");

        if output.status.success() {
            Ok(output)
        } else {
            let mut reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if reason.is_empty() {
                reason = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            Err(ToolboxError::CommandFailed {
                command: format!("jattach {} {}", pid, args.join(" ")),
                reason,
            })
        }
    }

    /// Run with inherited stdio.
    pub fn run_inherited(&self, pid: i32, args: &[&str]) -> Result<ExitStatus> {
        Ok(self.command(pid, args).status()?)
    }

    /// Full thread dump text.
    pub fn threaddump(&self, pid: i32) -> Result<Vec<u8>> {
        Ok(self.run(pid, &["threaddump"])?.stdout)
    }

    /// Ask the JVM to write a heap dump to `path` (a path inside the
    /// container). Only live objects unless `all`.
    pub fn dumpheap(&self, pid: i32, path: &Path, all: bool) -> Result<()> {
        let path = path.to_string_lossy();
        let mut args = vec!["dumpheap", path.as_ref()];
        if all {
            args.push("-all");
        }
        self.run(pid, &args)?;
        Ok(())
    }

    /// Run a jcmd command, returning its text output.
    pub fn jcmd(&self, pid: i32, command: &str) -> Result<String> {
        let output = self.run(pid, &["jcmd", command])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Flight recorder commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JfrAction {
    Start,
    Stop,
    Dump,
    Check,
}

/// Default recording name.
pub const DEFAULT_RECORDING: &str = "diag";

/// Default JFR settings profile.
pub const DEFAULT_SETTINGS: &str = "profile";

/// A JFR jcmd line.
#[derive(Debug, Clone)]
pub struct JfrCommand<'a> {
    pub action: JfrAction,
    pub name: &'a str,
    pub settings: &'a str,
    /// Output file for stop/dump.
    pub filename: Option<&'a Path>,
}

impl JfrCommand<'_> {
    /// Render as the argument of `jattach <pid> jcmd`.
    pub fn render(&self) -> String {
        let mut cmd = match self.action {
            JfrAction::Start => format!("JFR.start name={} settings={}", self.name, self.settings),
            JfrAction::Stop => format!("JFR.stop name={}", self.name),
            JfrAction::Dump => format!("JFR.dump name={}", self.name),
            JfrAction::Check => return "JFR.check".to_string(),
        };
        if let Some(f) = self.filename {
            if matches!(self.action, JfrAction::Stop | JfrAction::Dump) {
                cmd.push_str(&format!(" filename={}", f.display()));
            }
        }
        cmd
    }

    /// Whether the command writes a recording file.
    pub fn writes_file(&self) -> bool {
        self.filename.is_some() && matches!(self.action, JfrAction::Stop | JfrAction::Dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// A jattach stand-in that echoes its arguments.
    fn fake_jattach(dir: &Path, exit: i32) -> Jattach {
        let path = dir.join("jattach");
        fs::write(&path, format!("#!/bin/sh\necho \"$@\"\nexit {}\n", exit)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Jattach::new(path)
    }

    #[test]
    fn test_render_start() {
        let cmd = JfrCommand {
            action: JfrAction::Start,
            name: DEFAULT_RECORDING,
            settings: DEFAULT_SETTINGS,
            filename: None,
        };
        assert_eq!(cmd.render(), "JFR.start name=diag settings=profile");
        assert!(!cmd.writes_file());
    }

    #[test]
    fn test_render_stop_with_file() {
        let file = Path::new("/tmp/recording.jfr");
        let cmd = JfrCommand {
            action: JfrAction::Stop,
            name: "r1",
            settings: DEFAULT_SETTINGS,
            filename: Some(file),
        };
        assert_eq!(cmd.render(), "JFR.stop name=r1 filename=/tmp/recording.jfr");
        assert!(cmd.writes_file());
    }

    #[test]
    fn test_render_dump_and_check() {
        let file = Path::new("/tmp/d.jfr");
        let dump = JfrCommand {
            action: JfrAction::Dump,
            name: "r1",
            settings: DEFAULT_SETTINGS,
            filename: Some(file),
        };
        assert_eq!(dump.render(), "JFR.dump name=r1 filename=/tmp/d.jfr");

        let check = JfrCommand {
            action: JfrAction::Check,
            name: "r1",
            settings: DEFAULT_SETTINGS,
            filename: Some(file),
        };
        assert_eq!(check.render(), "JFR.check");
        assert!(!check.writes_file());
    }

    #[test]
    fn test_threaddump_passes_pid() {
        let dir = tempdir().unwrap();
        let jattach = fake_jattach(dir.path(), 0);
        let out = jattach.threaddump(4242).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "4242 threaddump");
    }

    #[test]
    fn test_dumpheap_all() {
        let dir = tempdir().unwrap();
        let jattach = fake_jattach(dir.path(), 0);
        jattach.dumpheap(1, Path::new("/tmp/h.hprof"), true).unwrap();
    }

    #[test]
    fn test_jcmd_failure() {
        let dir = tempdir().unwrap();
        let jattach = fake_jattach(dir.path(), 1);
        let err = jattach.jcmd(7, "JFR.check").unwrap_err();
        match err {
            ToolboxError::CommandFailed { command, reason } => {
                assert_eq!(command, "jattach 7 jcmd JFR.check");
                assert_eq!(reason, "7 jcmd JFR.check");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
