//! Filesystem helpers shared by archivers, destinations and the restore path

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Result of a best-effort tree copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    pub failed: usize,
}

/// Copy a single file, creating the destination's parent directories
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)
}

/// Copy a directory tree, failing on the first error
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut bytes = 0;
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            bytes += copy_file(entry.path(), &target)?;
        }
    }

    Ok(bytes)
}

/// Copy the contents of `src` into `dst`, logging and skipping entries that fail
pub fn copy_tree(src: &Path, dst: &Path) -> CopyStats {
    let mut stats = CopyStats::default();

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry below {:?}: {}", src, e);
                stats.failed += 1;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);

        let result = if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map(|_| ())
        } else {
            copy_file(entry.path(), &target).map(|_| ())
        };

        match result {
            Ok(()) if entry.file_type().is_dir() => {}
            Ok(()) => {
                debug!("Copied {:?} to {:?}", entry.path(), target);
                stats.copied += 1;
            }
            Err(e) => {
                warn!("Could not copy {:?} to {:?}: {}", entry.path(), target, e);
                stats.failed += 1;
            }
        }
    }

    stats
}

/// Remove a file or a directory tree if it exists
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// True if the directory has no entries (a missing directory counts as empty)
pub fn is_empty_dir(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Check that a directory exists and that a file can be created in it
pub fn is_writable_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    let marker = path.join(".periodic-backup-write-check");
    match fs::write(&marker, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}

/// Join path components with `/`, independent of the platform separator
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical form of a path, or the path itself when it cannot be resolved
pub fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
