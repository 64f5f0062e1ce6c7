//! Finding JVMs through procfs.
//!
//! A container's processes share the PID namespace of its init process, so
//! the Java processes of a container are the `java` processes whose
//! `ns/pid` link matches the init PID's.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{Result, ToolboxError};

/// A JVM found inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaProcess {
    /// PID on the host.
    pub host_pid: i32,
    /// PID as seen inside the container.
    pub ns_pid: i32,
    /// Command line, arguments joined with spaces.
    pub cmdline: String,
}

/// Reader for a procfs mount.
#[derive(Debug, Clone)]
pub struct Procfs {
    root: PathBuf,
}

impl Procfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pid_dir(&self, pid: i32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    pub fn exists(&self, pid: i32) -> bool {
        self.pid_dir(pid).is_dir()
    }

    /// All numeric entries of the procfs root, ascending.
    pub fn pids(&self) -> Result<Vec<i32>> {
        let mut pids: Vec<i32> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Target of the `ns/pid` link, e.g. `pid:[4026531836]`.
    pub fn pid_namespace(&self, pid: i32) -> std::io::Result<String> {
        let link = fs::read_link(self.pid_dir(pid).join("ns/pid"))?;
        Ok(link.to_string_lossy().into_owned())
    }

    pub fn comm(&self, pid: i32) -> std::io::Result<String> {
        Ok(fs::read_to_string(self.pid_dir(pid).join("comm"))?
            .trim_end()
            .to_string())
    }

    /// Command line arguments.
    pub fn cmdline(&self, pid: i32) -> std::io::Result<Vec<String>> {
        let raw = fs::read(self.pid_dir(pid).join("cmdline"))?;
        Ok(raw
            .split(|b| *b == 0)
            .filter(|a| !a.is_empty())
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect())
    }

    /// Innermost PID from the `NSpid:` line of `status`, or `pid` itself on
    /// kernels without the field.
    pub fn ns_pid(&self, pid: i32) -> std::io::Result<i32> {
        let status = fs::read_to_string(self.pid_dir(pid).join("status"))?;
        Ok(parse_ns_pid(&status).unwrap_or(pid))
    }

    /// Whether `pid` looks like a JVM launcher process.
    pub fn is_java(&self, pid: i32) -> bool {
        if matches!(self.comm(pid).as_deref(), Ok("java")) {
            return true;
        }
        self.cmdline(pid)
            .ok()
            .and_then(|args| args.into_iter().next())
            .map(|argv0| Path::new(&argv0).file_name().is_some_and(|n| n == "java"))
            .unwrap_or(false)
    }

    fn java_process(&self, pid: i32) -> std::io::Result<JavaProcess> {
        Ok(JavaProcess {
            host_pid: pid,
            ns_pid: self.ns_pid(pid)?,
            cmdline: self.cmdline(pid)?.join(" "),
        })
    }

    /// Java processes sharing the PID namespace of `container_pid`.
    ///
    /// # Errors
    ///
    /// Returns `ToolboxError::PidNotFound` if `container_pid` has no
    /// readable namespace link.
    pub fn java_processes(&self, container_pid: i32) -> Result<Vec<JavaProcess>> {
        let ns = self.pid_namespace(container_pid).map_err(|e| {
            ToolboxError::PidNotFound(format!("namespace of pid {}: {}", container_pid, e))
        })?;
        debug!(container_pid, namespace = %ns, "scanning for java processes");

        let mut found = Vec::new();
        for pid in self.pids()? {
            // processes can exit while we scan
            match self.pid_namespace(pid) {
                Ok(other) if other == ns => {}
                _ => continue,
            }
            if !self.is_java(pid) {
                continue;
            }
            match self.java_process(pid) {
                Ok(p) => {
                    trace!(host_pid = p.host_pid, ns_pid = p.ns_pid, "java process");
                    found.push(p);
                }
                Err(e) => debug!(pid, error = %e, "java process vanished"),
            }
        }
        Ok(found)
    }

    /// Describe a host PID given explicitly (`JAVAPID`).
    pub fn describe(&self, pid: i32) -> Result<JavaProcess> {
        if !self.exists(pid) {
            return Err(ToolboxError::PidNotFound(format!("process {} does not exist", pid)));
        }
        Ok(self.java_process(pid)?)
    }
}

fn parse_ns_pid(status: &str) -> Option<i32> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("NSpid:"))
        .and_then(|rest| rest.split_whitespace().last())
        .and_then(|p| p.parse().ok())
}
