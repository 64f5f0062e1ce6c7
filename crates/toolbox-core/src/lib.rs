//! Diagnostic operations of the k8s diagnostics toolbox.
//!
//! Every operation starts from a pod name and works from the node:
//! - Resolve the pod to its container, the container's init PID and root
//!   filesystem, and the JVM running in it
//! - Attach to the JVM with jattach (thread dumps, heap dumps, JFR)
//! - Run async-profiler inside the container namespaces
//! - Move the results out of the container into the current directory and
//!   hand them to the invoking `sudo` user
//! - Upload results encrypted
//!
//! # Example
//!
//! ```no_run
//! use toolbox_core::{Config, Toolbox};
//!
//! let toolbox = Toolbox::from_config(Config::from_env().unwrap()).unwrap();
//! let dump = toolbox.threaddump("pulsar-broker-0").unwrap();
//! println!("thread dump in {}", dump.display());
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod jattach;
pub mod nsenter;
pub mod procfs;
pub mod profiler;
pub mod relocate;
pub mod target;
pub mod toolbox;
pub mod transfer;
pub mod wait;

pub use artifact::{Artifact, ArtifactKind, ProfileFormat};
pub use config::Config;
pub use error::{Result, ToolboxError};
pub use jattach::{JfrAction, DEFAULT_RECORDING, DEFAULT_SETTINGS};
pub use procfs::{JavaProcess, Procfs};
pub use profiler::ProfilerEvent;
pub use target::Target;
pub use toolbox::{FlamegraphMode, JfrOutcome, ProfileOptions, Toolbox};
pub use transfer::Transfer;
pub use wait::StopReason;
