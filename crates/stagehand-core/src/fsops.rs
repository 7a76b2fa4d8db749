//! Crash-safe filesystem primitives shared by staging, apply and rollback.
//!
//! Manifests and logs are the source of truth for every pipeline step, so they
//! are written with temp file + fsync + rename + directory sync. Moves fall back
//! to copy-then-remove when `rename` cannot cross filesystems.

use filetime::FileTime;
use serde::Serialize;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{Error, IoContext, Result};

/// Replace a leading `~` with the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Make `path` absolute against the current directory and fold `.`/`..`
/// lexically. Does not touch the filesystem beyond reading the cwd.
pub fn absolutize(path: &Path) -> PathBuf {
    let path = expand_tilde(path);
    let joined = if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolve symlinks in the longest existing ancestor of `path` and re-append
/// the remainder. Works for paths that do not exist yet.
pub fn resolve_lenient(path: &Path) -> PathBuf {
    let absolute = absolutize(path);
    let mut existing = absolute.as_path();
    let mut rest: Vec<&std::ffi::OsStr> = Vec::new();

    loop {
        if let Ok(resolved) = fs::canonicalize(existing) {
            let mut out = resolved;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}

/// Manifest identifiers become directory names, so they must be one plain component.
pub fn validate_manifest_id(id: &str) -> Result<()> {
    let trimmed = id.trim();
    let mut components = Path::new(trimmed).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if trimmed.is_empty() || trimmed != id || !single_normal || id.contains(['/', '\\']) {
        return Err(Error::InvalidArgument(format!(
            "manifest id must be a single path component, got {:?}",
            id
        )));
    }
    Ok(())
}

/// Write data to a file atomically with fsync.
///
/// Data goes to a hidden temp file beside the target, is synced, renamed over
/// the target, and the parent directory is synced so the rename is durable.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "cannot determine parent directory for {}",
            path.display()
        ))
    })?;
    fs::create_dir_all(parent).op_context("create directory", parent)?;

    let temp_name = format!(
        ".{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string()),
        std::process::id()
    );
    let temp_path = parent.join(temp_name);

    let write_result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::file_op("write temp file", &temp_path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::file_op("replace", path, e));
    }

    sync_directory(parent)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &data)
}

/// Sync a directory so renames inside it survive a crash. No-op off unix.
pub fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path).op_context("open directory", path)?;
        dir.sync_all().op_context("sync directory", path)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Copy file bytes, permissions and timestamps.
pub fn copy_with_metadata(from: &Path, to: &Path) -> Result<u64> {
    let bytes = fs::copy(from, to).op_context("copy", from)?;
    let metadata = fs::metadata(from).op_context("read metadata of", from)?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(to, atime, mtime).op_context("set timestamps on", to)?;
    Ok(bytes)
}

/// Move a file, creating the destination's parent directories.
///
/// Tries `rename` first. If that fails and the source is a regular file the
/// move degrades to copy + remove, which is how cross-device moves succeed.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).op_context("create directory", parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            let is_file = fs::symlink_metadata(from)
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(Error::file_op("move", from, rename_err));
            }
            debug!(
                from = %from.display(),
                to = %to.display(),
                error = %rename_err,
                "rename failed, falling back to copy"
            );
            copy_with_metadata(from, to)?;
            fs::remove_file(from).op_context("remove", from)?;
            Ok(())
        }
    }
}

/// `true` when something (file, dir, or dangling symlink) occupies `path`.
pub fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
