//! Descriptors of the downloadable diagnostic tools.

use std::fmt;
use std::path::PathBuf;

use crate::{Result, ToolError};

/// CPU architectures that have tool releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    /// Architecture of the running binary.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::UnsupportedArch` for anything but x86_64/aarch64.
    pub fn current() -> Result<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Map a `std::env::consts::ARCH` value.
    pub fn from_rust_arch(arch: &str) -> Result<Self> {
        match arch {
            "x86_64" => Ok(Arch::X64),
            "aarch64" => Ok(Arch::Arm64),
            other => Err(ToolError::UnsupportedArch(other.to_string())),
        }
    }

    /// Go-style name used by cri-tools releases.
    fn goarch(self) -> &'static str {
        match self {
            Arch::X64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Name used by jattach and async-profiler releases.
    fn short(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }
}

/// A tool the toolbox downloads on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Crictl,
    Jattach,
    AsyncProfiler,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Crictl, Tool::Jattach, Tool::AsyncProfiler];

    /// Directory name under the cache root.
    pub fn name(self) -> &'static str {
        match self {
            Tool::Crictl => "crictl",
            Tool::Jattach => "jattach",
            Tool::AsyncProfiler => "async-profiler",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Tool::Crictl => "1.28.0",
            Tool::Jattach => "2.2",
            Tool::AsyncProfiler => "2.9",
        }
    }

    /// Release archive URL. All releases are gzipped tarballs.
    pub fn url(self, arch: Arch) -> String {
        let v = self.version();
        match self {
            Tool::Crictl => format!(
                "https://github.com/kubernetes-sigs/cri-tools/releases/download/v{v}/crictl-v{v}-linux-{}.tar.gz",
                arch.goarch()
            ),
            Tool::Jattach => format!(
                "https://github.com/jattach/jattach/releases/download/v{v}/jattach-linux-{}.tgz",
                arch.short()
            ),
            Tool::AsyncProfiler => format!(
                "https://github.com/async-profiler/async-profiler/releases/download/v{v}/async-profiler-{v}-linux-{}.tar.gz",
                arch.short()
            ),
        }
    }

    /// Top directory the archive unpacks into, relative to the tool dir.
    pub fn home(self, arch: Arch) -> PathBuf {
        match self {
            Tool::AsyncProfiler => {
                PathBuf::from(format!("async-profiler-{}-linux-{}", self.version(), arch.short()))
            }
            Tool::Crictl | Tool::Jattach => PathBuf::new(),
        }
    }

    /// Executable to run, relative to the tool dir.
    pub fn entry_point(self, arch: Arch) -> PathBuf {
        match self {
            Tool::Crictl => PathBuf::from("crictl"),
            Tool::Jattach => PathBuf::from("jattach"),
            Tool::AsyncProfiler => self.home(arch).join("profiler.sh"),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
