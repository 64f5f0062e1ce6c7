//! On-disk tool cache.
//!
//! Layout:
//!
//! ```text
//! ~/.cache/k8s-diagnostics-toolbox/
//! ├── crictl/crictl
//! ├── jattach/jattach
//! └── async-profiler/async-profiler-2.9-linux-x64/
//!     ├── profiler.sh
//!     └── build/{libasyncProfiler.so,converter.jar,jattach}
//! ```

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use crate::{Arch, Result, Tool, ToolError};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Cache of downloaded tool releases.
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
    arch: Arch,
}

impl ToolCache {
    /// Cache rooted at `root` for the running architecture.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_arch(root, Arch::current()?))
    }

    pub fn with_arch(root: impl Into<PathBuf>, arch: Arch) -> Self {
        Self {
            root: root.into(),
            arch,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// `<root>/<tool>`.
    pub fn tool_dir(&self, tool: Tool) -> PathBuf {
        self.root.join(tool.name())
    }

    /// Unpacked release directory of `tool`.
    pub fn home(&self, tool: Tool) -> PathBuf {
        self.tool_dir(tool).join(tool.home(self.arch))
    }

    pub fn entry_point(&self, tool: Tool) -> PathBuf {
        self.tool_dir(tool).join(tool.entry_point(self.arch))
    }

    pub fn is_installed(&self, tool: Tool) -> bool {
        self.entry_point(tool).is_file()
    }

    /// Return the tool's entry point, downloading it first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the download, extraction or install fails.
    pub fn ensure(&self, tool: Tool) -> Result<PathBuf> {
        let entry = self.entry_point(tool);
        if entry.is_file() {
            debug!(tool = %tool, path = %entry.display(), "tool cached");
            return Ok(entry);
        }

        let url = tool.url(self.arch);
        info!(tool = %tool, version = tool.version(), url = %url, "downloading tool");
        let bytes = download(&url)?;
        self.install_archive(tool, &bytes)
    }

    /// Unpack a release archive into the tool dir.
    pub fn install_archive(&self, tool: Tool, archive: &[u8]) -> Result<PathBuf> {
        let dir = self.tool_dir(tool);
        let archive_path = dir.join(format!("{}-{}.tar.gz", tool.name(), tool.version()));

        atomic_write(&archive_path, archive)?;
        let extracted = extract_tar_gz(&archive_path, &dir);
        let _ = fs::remove_file(&archive_path);
        extracted?;

        let entry = self.entry_point(tool);
        if !entry.is_file() {
            return Err(ToolError::MissingEntryPoint {
                tool: tool.name().to_string(),
                path: entry,
            });
        }
        make_executable(&entry)?;

        info!(tool = %tool, path = %entry.display(), "tool installed");
        Ok(entry)
    }
}

/// Fetch `url` into memory.
fn download(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .user_agent(concat!("k8s-diagnostics-toolbox/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| ToolError::Download {
            url: url.to_string(),
            source,
        })?;

    let response = client.get(url).send().map_err(|source| ToolError::Download {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|source| ToolError::Download {
        url: url.to_string(),
        source,
    })?;
    debug!(url = %url, bytes = bytes.len(), "download complete");
    Ok(bytes.to_vec())
}

/// Write `data` to `path` through a temp file in the same directory.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|source| ToolError::WriteError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut temp_file =
        tempfile::NamedTempFile::new_in(dir).map_err(|source| ToolError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;

    temp_file
        .write_all(data)
        .and_then(|_| temp_file.flush())
        .map_err(|source| ToolError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;

    temp_file
        .persist(path)
        .map_err(|e| ToolError::WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

fn extract_tar_gz(archive: &Path, into: &Path) -> Result<()> {
    debug!(archive = %archive.display(), into = %into.display(), "extracting");
    let output = Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(into)
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ToolError::Extract {
            archive: archive.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Build a .tar.gz containing `files` (relative path, content).
    fn make_archive(files: &[(&str, &str)]) -> Vec<u8> {
        let staging = tempdir().unwrap();
        for (rel, content) in files {
            let p = staging.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        let out = tempdir().unwrap();
        let archive = out.path().join("a.tar.gz");
        let mut names: Vec<&str> = files
            .iter()
            .map(|(rel, _)| rel.split('/').next().unwrap())
            .collect();
        names.dedup();
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(staging.path())
            .args(names)
            .status()
            .unwrap();
        assert!(status.success());
        fs::read(archive).unwrap()
    }

    #[test]
    fn test_paths() {
        let cache = ToolCache::with_arch("/cache", Arch::X64);
        assert_eq!(cache.tool_dir(Tool::Jattach), PathBuf::from("/cache/jattach"));
        assert_eq!(
            cache.entry_point(Tool::AsyncProfiler),
            PathBuf::from("/cache/async-profiler/async-profiler-2.9-linux-x64/profiler.sh")
        );
        assert_eq!(
            cache.home(Tool::AsyncProfiler),
            PathBuf::from("/cache/async-profiler/async-profiler-2.9-linux-x64")
        );
    }

    #[test]
    fn test_install_archive() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::with_arch(dir.path(), Arch::X64);
        assert!(!cache.is_installed(Tool::Jattach));

        let archive = make_archive(&[("jattach", "#!/bin/sh\necho jattach\n")]);
        let entry = cache.install_archive(Tool::Jattach, &archive).unwrap();

        assert_eq!(entry, cache.entry_point(Tool::Jattach));
        assert!(cache.is_installed(Tool::Jattach));
        let mode = fs::metadata(&entry).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        // archive is cleaned up
        assert_eq!(fs::read_dir(cache.tool_dir(Tool::Jattach)).unwrap().count(), 1);
    }

    #[test]
    fn test_install_archive_nested_home() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::with_arch(dir.path(), Arch::Arm64);
        let archive = make_archive(&[
            ("async-profiler-2.9-linux-arm64/profiler.sh", "#!/bin/sh\n"),
            ("async-profiler-2.9-linux-arm64/build/converter.jar", "jar"),
        ]);
        cache.install_archive(Tool::AsyncProfiler, &archive).unwrap();
        assert!(cache.home(Tool::AsyncProfiler).join("build/converter.jar").is_file());
    }

    #[test]
    fn test_install_archive_missing_entry_point() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::with_arch(dir.path(), Arch::X64);
        let archive = make_archive(&[("README", "no binary here")]);
        let result = cache.install_archive(Tool::Crictl, &archive);
        assert!(matches!(result, Err(ToolError::MissingEntryPoint { .. })));
    }

    #[test]
    fn test_install_archive_corrupt() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::with_arch(dir.path(), Arch::X64);
        let result = cache.install_archive(Tool::Crictl, b"definitely not gzip");
        assert!(matches!(result, Err(ToolError::Extract { .. })));
    }

    #[test]
    fn test_ensure_uses_cached_copy() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::with_arch(dir.path(), Arch::X64);
        let entry = cache.entry_point(Tool::Crictl);
        fs::create_dir_all(entry.parent().unwrap()).unwrap();
        fs::write(&entry, "cached").unwrap();

        // no network access happens for a cached tool
        assert_eq!(cache.ensure(Tool::Crictl).unwrap(), entry);
    }

    #[test]
    #[ignore]
    fn test_ensure_downloads_jattach() {
        let dir = tempdir().unwrap();
        let cache = ToolCache::new(dir.path()).unwrap();
        let entry = cache.ensure(Tool::Jattach).unwrap();
        assert!(entry.is_file());
    }
}
