//! A resolved diagnostic target.

use std::path::{Path, PathBuf};

use serde::Serialize;
use toolbox_runtime::ContainerInfo;

use crate::procfs::JavaProcess;
use crate::{Result, ToolboxError};

/// Pod → container → init PID → root path → JVM.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    /// Name the operator used.
    pub pod: String,
    pub container: ContainerInfo,
    /// Host PID of the container init process.
    pub pid: i32,
    /// Host path of the container root filesystem, when found.
    pub root_path: Option<PathBuf>,
    /// The JVM to diagnose.
    pub java: JavaProcess,
}

impl Target {
    /// Root filesystem, required by anything that exchanges files.
    ///
    /// # Errors
    ///
    /// Returns `ToolboxError::RootPathNotFound` if it could not be located.
    pub fn root(&self) -> Result<&Path> {
        self.root_path
            .as_deref()
            .ok_or_else(|| ToolboxError::RootPathNotFound(self.container.id.clone()))
    }
}

/// Pick the root path: the init process' `root` link in procfs, which sees
/// the container's own mounts, else the runtime's answer when it exists on
/// disk.
pub fn root_path(reported: Option<&Path>, proc_root: &Path, pid: i32) -> Option<PathBuf> {
    let via_proc = proc_root.join(pid.to_string()).join("root");
    if via_proc.is_dir() {
        return Some(via_proc);
    }
    reported.filter(|p| p.is_dir()).map(Path::to_path_buf)
}

/// Choose among the JVMs of a container: the lowest PID wins.
pub fn choose_java(
    mut found: Vec<JavaProcess>,
    pod: &str,
) -> Result<(JavaProcess, Vec<JavaProcess>)> {
    if found.is_empty() {
        return Err(ToolboxError::PidNotFound(format!("no java process in '{}'", pod)));
    }
    found.sort_by_key(|p| p.host_pid);
    let chosen = found.remove(0);
    Ok((chosen, found))
}
