// SPDX-License-Identifier: Apache-2.0

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Group, Uid, User};

use crate::{ErrorKind, RtconfError};

const DEFAULT_FILE_MODE: u32 = 0o644;

/// Ownership and permission of a generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct FileOptions {
    pub user: Option<String>,
    pub group: Option<String>,
    /// Defaults to 0644
    pub mode: Option<u32>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, user: &str, group: &str) -> Self {
        self.user = Some(user.to_string());
        self.group = Some(group.to_string());
        self
    }
}

/// Resolve an absolute system path below `root`.
pub(crate) fn rooted(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

/// Replace `path` with `content` so that readers see either the old or
/// the new file, never a partial one.
pub(crate) fn write_atomic(
    path: &Path,
    content: &[u8],
    opts: &FileOptions,
) -> Result<(), RtconfError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| io_error(&dir, e))?;
    tmp.write_all(content).map_err(|e| io_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    std::fs::set_permissions(
        tmp.path(),
        Permissions::from_mode(opts.mode.unwrap_or(DEFAULT_FILE_MODE)),
    )
    .map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    if opts.user.is_some() || opts.group.is_some() {
        chown(path, opts.user.as_deref(), opts.group.as_deref())?;
    }
    log::debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

pub(crate) fn chown(
    path: &Path,
    user: Option<&str>,
    group: Option<&str>,
) -> Result<(), RtconfError> {
    let uid: Option<Uid> = match user {
        Some(name) => Some(
            User::from_name(name)?
                .ok_or_else(|| {
                    RtconfError::new(
                        ErrorKind::InvalidArgument,
                        format!("User {name} does not exist"),
                    )
                })?
                .uid,
        ),
        None => None,
    };
    let gid: Option<Gid> = match group {
        Some(name) => Some(
            Group::from_name(name)?
                .ok_or_else(|| {
                    RtconfError::new(
                        ErrorKind::InvalidArgument,
                        format!("Group {name} does not exist"),
                    )
                })?
                .gid,
        ),
        None => None,
    };
    nix::unistd::chown(path, uid, gid)?;
    Ok(())
}

pub(crate) fn chmod(path: &Path, mode: u32) -> Result<(), RtconfError> {
    std::fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|e| io_error(path, e))
}

/// Remove `path`, a missing file is not an error.
pub(crate) fn remove_file(path: &Path) -> Result<bool, RtconfError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

pub(crate) fn io_error(path: &Path, e: std::io::Error) -> RtconfError {
    let e = RtconfError::new(
        ErrorKind::IoError,
        format!("{}: {e}", path.display()),
    );
    log::error!("{}", e);
    e
}
