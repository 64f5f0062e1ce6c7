//! async-profiler inside a container.
//!
//! The release is copied into the container's `/tmp/async-profiler` and
//! `profiler.sh` runs inside the container's mount and pid namespaces,
//! addressing the JVM by its in-container PID.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::ProfileFormat;
use crate::nsenter::{Nsenter, EXEC_NAMESPACES};
use crate::relocate::host_path;
use crate::{Result, ToolboxError};

/// Where the release lives inside the container.
pub const CONTAINER_HOME: &str = "/tmp/async-profiler";

/// Profiling events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilerEvent {
    #[default]
    Cpu,
    Alloc,
    Lock,
    Wall,
    Itimer,
}

impl ProfilerEvent {
    pub fn as_arg(self) -> &'static str {
        match self {
            ProfilerEvent::Cpu => "cpu",
            ProfilerEvent::Alloc => "alloc",
            ProfilerEvent::Lock => "lock",
            ProfilerEvent::Wall => "wall",
            ProfilerEvent::Itimer => "itimer",
        }
    }
}

impl FromStr for ProfilerEvent {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(ProfilerEvent::Cpu),
            "alloc" => Ok(ProfilerEvent::Alloc),
            "lock" => Ok(ProfilerEvent::Lock),
            "wall" => Ok(ProfilerEvent::Wall),
            "itimer" => Ok(ProfilerEvent::Itimer),
            other => Err(ToolboxError::InvalidArgument(format!(
                "unknown profiling event '{}'",
                other
            ))),
        }
    }
}

/// Copy the unpacked release `home` into `<root>/tmp/async-profiler`.
///
/// An existing copy with a `profiler.sh` is left alone.
pub fn install_into(root: &Path, home: &Path) -> Result<PathBuf> {
    let target = host_path(root, Path::new(CONTAINER_HOME));
    if target.join("profiler.sh").is_file() {
        debug!(target = %target.display(), "async-profiler already in container");
        return Ok(target);
    }

    for entry in WalkDir::new(home) {
        let entry = entry.map_err(|e| ToolboxError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(home)
            .map_err(|e| ToolboxError::InvalidArgument(e.to_string()))?;
        let dest = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }

    info!(target = %target.display(), "async-profiler copied into container");
    Ok(target)
}

/// `start` arguments.
pub fn start_args(
    event: ProfilerEvent,
    file: &Path,
    format: ProfileFormat,
    extra: &[String],
    ns_pid: i32,
) -> Vec<String> {
    let mut args = vec![
        "start".to_string(),
        "-e".to_string(),
        event.as_arg().to_string(),
        "-f".to_string(),
        file.display().to_string(),
        "-o".to_string(),
        format.as_arg().to_string(),
    ];
    args.extend(extra.iter().cloned());
    args.push(ns_pid.to_string());
    args
}

/// `stop` arguments.
pub fn stop_args(file: &Path, format: ProfileFormat, extra: &[String], ns_pid: i32) -> Vec<String> {
    let mut args = vec![
        "stop".to_string(),
        "-f".to_string(),
        file.display().to_string(),
        "-o".to_string(),
        format.as_arg().to_string(),
    ];
    args.extend(extra.iter().cloned());
    args.push(ns_pid.to_string());
    args
}

/// profiler.sh bound to one JVM.
#[derive(Debug, Clone)]
pub struct AsyncProfiler {
    nsenter: Nsenter,
    ns_pid: i32,
}

impl AsyncProfiler {
    pub fn new(nsenter: Nsenter, ns_pid: i32) -> Self {
        Self { nsenter, ns_pid }
    }

    fn script() -> String {
        format!("{}/profiler.sh", CONTAINER_HOME)
    }

    /// Run profiler.sh with arbitrary arguments, the PID appended.
    pub fn passthrough(&self, args: &[String]) -> Result<std::process::ExitStatus> {
        let mut args = args.to_vec();
        args.push(self.ns_pid.to_string());
        self.nsenter
            .run_inherited(EXEC_NAMESPACES, &Self::script(), &args, None)
    }

    pub fn start(
        &self,
        event: ProfilerEvent,
        file: &Path,
        format: ProfileFormat,
        extra: &[String],
    ) -> Result<String> {
        let args = start_args(event, file, format, extra, self.ns_pid);
        let out = self.nsenter.run(EXEC_NAMESPACES, &Self::script(), &args)?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    pub fn stop(&self, file: &Path, format: ProfileFormat, extra: &[String]) -> Result<String> {
        let args = stop_args(file, format, extra, self.ns_pid);
        let out = self.nsenter.run(EXEC_NAMESPACES, &Self::script(), &args)?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}
