//! Tool cache for the k8s diagnostics toolbox.
//!
//! `crictl`, `jattach` and `async-profiler` are not expected to be installed
//! on the node. They are fetched from fixed GitHub releases on first use and
//! kept under `~/.cache/k8s-diagnostics-toolbox/<tool>`.
//!
//! # Example
//!
//! ```no_run
//! use toolbox_tools::{Tool, ToolCache};
//!
//! let cache = ToolCache::new("/root/.cache/k8s-diagnostics-toolbox").unwrap();
//! let jattach = cache.ensure(Tool::Jattach).unwrap();
//! println!("jattach at {}", jattach.display());
//! ```

pub mod cache;
pub mod error;
pub mod tool;

pub use cache::ToolCache;
pub use error::{Result, ToolError};
pub use tool::{Arch, Tool};
