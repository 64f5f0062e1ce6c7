//! Moving results out of a container's root filesystem.

use std::fs;
use std::io;
use std::os::unix::fs::chown;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{Result, ToolboxError};

/// Owner that relocated files are handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// Look up a local user by name (typically `SUDO_USER`).
    pub fn lookup(user: &str) -> Option<Self> {
        let found = uzers::get_user_by_name(user).map(|u| Owner {
            uid: u.uid(),
            gid: u.primary_group_id(),
        });
        if found.is_none() {
            warn!(user = %user, "user not found, files keep their owner");
        }
        found
    }
}

/// Host path of `container_path` under `root`.
///
/// Only normal components are kept so the result never escapes `root`.
pub fn host_path(root: &Path, container_path: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for c in container_path.components() {
        if let Component::Normal(part) = c {
            out.push(part);
        }
    }
    out
}

/// Move `<root>/<container_path>` into `dest_dir`, keeping the file name.
///
/// # Errors
///
/// Returns `ToolboxError::OutputMissing` if the source does not exist.
pub fn relocate(
    root: &Path,
    container_path: &Path,
    dest_dir: &Path,
    owner: Option<Owner>,
) -> Result<PathBuf> {
    let source = host_path(root, container_path);
    if !source.exists() {
        return Err(ToolboxError::OutputMissing(source));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| ToolboxError::OutputMissing(source.clone()))?;
    fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(file_name);

    move_file(&source, &dest)?;
    if let Some(owner) = owner {
        hand_over(&dest, owner);
    }

    info!(from = %source.display(), to = %dest.display(), "result relocated");
    Ok(dest)
}

/// Rename, or copy and delete when crossing filesystems.
pub fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if crosses_devices(&e) => {
            debug!(source = %source.display(), "cross-device move, copying");
            fs::copy(source, dest)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}

fn crosses_devices(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::CrossesDevices
}

/// chown `path` to `owner`, logging failures.
pub fn hand_over(path: &Path, owner: Owner) {
    if let Err(e) = chown(path, Some(owner.uid), Some(owner.gid)) {
        warn!(path = %path.display(), uid = owner.uid, error = %e, "chown failed");
    }
}
