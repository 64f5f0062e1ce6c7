//! Core traits and types for container runtime backends.
//!
//! The `ContainerRuntime` trait hides whether containers are reached through
//! `crictl` (CRI runtimes such as containerd) or through `docker`. Everything
//! above this crate only sees container IDs, init PIDs and root paths.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::Result;

/// Pod name label set by the kubelet on every container.
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";

/// Pod namespace label set by the kubelet on every container.
pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";

/// Which CLI backs a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Crictl,
    Docker,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Crictl => write!(f, "crictl"),
            RuntimeKind::Docker => write!(f, "docker"),
        }
    }
}

/// What the runtime reports about one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    /// Full container ID.
    pub id: String,
    /// Container name, when the runtime reports one.
    pub name: Option<String>,
    /// Pod the container belongs to, from the kubelet label.
    pub pod: Option<String>,
    /// Host PID of the container's init process. `None` when not running.
    pub pid: Option<i32>,
    /// Host path of the container's root filesystem.
    pub root_path: Option<PathBuf>,
}

/// One row of `list_pods`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    pub id: String,
    pub name: String,
    pub namespace: Option<String>,
    pub state: String,
}

/// Trait for container runtime backends.
///
/// # Example
///
/// ```ignore
/// use toolbox_runtime::ContainerRuntime;
///
/// fn init_pid(runtime: &dyn ContainerRuntime, pod: &str) -> Option<i32> {
///     let id = runtime.find_container(pod, None).ok()?;
///     runtime.inspect(&id).ok()?.pid
/// }
/// ```
pub trait ContainerRuntime: Send + Sync {
    /// Which CLI this backend drives.
    fn kind(&self) -> RuntimeKind;

    /// Find the first running container of `pod`, optionally narrowed to a
    /// container name. Falls back to treating `pod` as a container ID.
    fn find_container(&self, pod: &str, container: Option<&str>) -> Result<String>;

    /// Inspect a container by ID.
    fn inspect(&self, id: &str) -> Result<ContainerInfo>;

    /// List pods known to the runtime.
    fn list_pods(&self) -> Result<Vec<PodSummary>>;

    /// Run the runtime CLI with the given arguments and inherited stdio.
    fn passthrough(&self, args: &[String]) -> Result<ExitStatus>;
}

/// Whether `s` has the shape of a (possibly truncated) container ID.
pub fn looks_like_container_id(s: &str) -> bool {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    ID_RE
        .get_or_init(|| Regex::new(r"^[0-9a-f]{12,64}$").expect("valid regex"))
        .is_match(s)
}

/// First non-empty line of command output, trimmed.
pub(crate) fn first_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}
