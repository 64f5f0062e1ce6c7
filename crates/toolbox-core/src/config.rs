//! Configuration from the process environment.
//!
//! # Environment Variables
//!
//! - `CONTAINER_RUNTIME_ENDPOINT`: CRI socket for crictl
//! - `KUBERNETES_SERVICE_HOST`: set on Kubernetes nodes/pods, selects crictl
//! - `JAVAPID`: diagnose this host PID instead of searching the container
//! - `ASYNC_PROFILER_OPTIONS`: extra options for async-profiler starts
//! - `SUDO_USER`: chown produced files to this user
//! - `PROFILE_DOCKER_ONLY`: force the docker backend
//! - `K8S_DIAG_CACHE_DIR`: override the tool cache root
//! - `TRANSFER_URL`: upload endpoint for `transfer`
//! - `HOST_PROC`: alternative procfs mount
//! - `SHELL`: program started by `shell`

use std::path::{Path, PathBuf};

use toolbox_runtime::{RuntimeKind, DEFAULT_ENDPOINT};

use crate::{Result, ToolboxError};

pub const RUNTIME_ENDPOINT_ENV: &str = "CONTAINER_RUNTIME_ENDPOINT";
pub const KUBERNETES_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const JAVA_PID_ENV: &str = "JAVAPID";
pub const ASYNC_PROFILER_OPTIONS_ENV: &str = "ASYNC_PROFILER_OPTIONS";
pub const SUDO_USER_ENV: &str = "SUDO_USER";
pub const DOCKER_ONLY_ENV: &str = "PROFILE_DOCKER_ONLY";
pub const CACHE_DIR_ENV: &str = "K8S_DIAG_CACHE_DIR";
pub const TRANSFER_URL_ENV: &str = "TRANSFER_URL";
pub const HOST_PROC_ENV: &str = "HOST_PROC";
pub const SHELL_ENV: &str = "SHELL";

/// Default upload endpoint.
pub const DEFAULT_TRANSFER_URL: &str = "https://transfer.sh/";

/// Shell used when `SHELL` is unset.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Cache directory name under `~/.cache`.
const CACHE_SUBDIR: &str = "k8s-diagnostics-toolbox";

/// Runtime configuration of the toolbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub runtime_endpoint: String,
    pub kubernetes_host: Option<String>,
    pub java_pid: Option<i32>,
    pub async_profiler_options: Option<String>,
    pub sudo_user: Option<String>,
    pub docker_only: bool,
    pub cache_dir: PathBuf,
    pub transfer_url: String,
    pub proc_root: PathBuf,
    pub shell: String,
}

impl Config {
    /// Build from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ToolboxError::Config` if `JAVAPID` is not a number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let java_pid = match get(JAVA_PID_ENV) {
            Some(v) => Some(v.trim().parse::<i32>().map_err(|_| {
                ToolboxError::Config(format!("{} must be a process id, got '{}'", JAVA_PID_ENV, v))
            })?),
            None => None,
        };

        let cache_dir = get(CACHE_DIR_ENV)
            .map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned()))
            .unwrap_or_else(default_cache_dir);

        Ok(Self {
            runtime_endpoint: get(RUNTIME_ENDPOINT_ENV)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            kubernetes_host: get(KUBERNETES_HOST_ENV),
            java_pid,
            async_profiler_options: get(ASYNC_PROFILER_OPTIONS_ENV),
            sudo_user: get(SUDO_USER_ENV),
            docker_only: get(DOCKER_ONLY_ENV).is_some(),
            cache_dir,
            transfer_url: get(TRANSFER_URL_ENV)
                .unwrap_or_else(|| DEFAULT_TRANSFER_URL.to_string()),
            proc_root: get(HOST_PROC_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/proc")),
            shell: get(SHELL_ENV).unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        })
    }

    /// Which runtime backend to use.
    ///
    /// Docker when forced; crictl on a Kubernetes node or when the CRI socket
    /// exists; docker otherwise.
    pub fn runtime_kind(&self) -> RuntimeKind {
        if self.docker_only {
            return RuntimeKind::Docker;
        }
        if self.kubernetes_host.is_some() {
            return RuntimeKind::Crictl;
        }
        match self.endpoint_socket() {
            Some(sock) if sock.exists() => RuntimeKind::Crictl,
            _ => RuntimeKind::Docker,
        }
    }

    /// Filesystem path of a `unix://` endpoint.
    pub fn endpoint_socket(&self) -> Option<&Path> {
        self.runtime_endpoint.strip_prefix("unix://").map(Path::new)
    }

    /// Extra async-profiler options split on whitespace.
    pub fn async_profiler_args(&self) -> Vec<String> {
        self.async_profiler_options
            .as_deref()
            .map(|o| o.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

/// `~/.cache/k8s-diagnostics-toolbox`, or `.cache/...` in the current
/// directory when there is no home.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cache"))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(CACHE_SUBDIR)
}
