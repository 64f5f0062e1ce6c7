//! Container runtime access for the k8s diagnostics toolbox.
//!
//! This crate turns a pod or container name into what the diagnostic tools
//! need from the runtime:
//! - Find the running container of a pod
//! - Inspect it for the init PID and root filesystem path
//! - List pods
//! - Pass arbitrary arguments through to the runtime CLI
//!
//! Two backends exist: [`CrictlRuntime`] for CRI runtimes on Kubernetes nodes
//! and [`DockerRuntime`] for plain docker hosts.
//!
//! # Example
//!
//! ```no_run
//! use toolbox_runtime::{ContainerRuntime, CrictlRuntime, DEFAULT_ENDPOINT};
//!
//! let runtime = CrictlRuntime::new("/usr/local/bin/crictl", DEFAULT_ENDPOINT);
//! let id = runtime.find_container("pulsar-broker-0", None).unwrap();
//! let info = runtime.inspect(&id).unwrap();
//! println!("init pid {:?}, root {:?}", info.pid, info.root_path);
//! ```

pub mod command;
pub mod crictl;
pub mod docker;
pub mod error;
pub mod traits;

pub use command::CliCommand;
pub use crictl::{CrictlRuntime, CONTAINERD_TASK_DIR, DEFAULT_ENDPOINT};
pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};
pub use traits::{
    looks_like_container_id, ContainerInfo, ContainerRuntime, PodSummary, RuntimeKind,
    POD_NAME_LABEL, POD_NAMESPACE_LABEL,
};
