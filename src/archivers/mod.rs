//! Archivers package the selected files into blobs and unpack them again
//!
//! An archiver is stateless; every backup run gets its own
//! [`ArchiveSession`] from [`Archiver::backup_start`]. The session is
//! consumed by [`ArchiveSession::finish`], so a finished archive cannot be
//! written to again.

mod null;
mod targz;
mod zipfile;

pub use null::NullArchiver;
pub use targz::TarGzArchiver;
pub use zipfile::ZipArchiver;

use crate::config::ArchiverConfig;
use crate::selection::SelectedFile;
use crate::utils::fs::remove_path;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Packages files into archive blobs and extracts them
pub trait Archiver: Send + Sync {
    /// Configuration identifying this archiver (recorded in manifests)
    fn config(&self) -> ArchiverConfig;

    /// Canonical extension of the produced blobs
    fn extension(&self) -> &'static str;

    /// Open a new archive named `<archive_filename_base>.<extension>` in `temp_dir`
    fn backup_start(
        &self,
        temp_dir: &Path,
        archive_filename_base: &str,
    ) -> Result<Box<dyn ArchiveSession>>;

    /// Extract every blob into `target_dir`; a blob that fails is logged and skipped
    fn unarchive_files(&self, archives: &[PathBuf], target_dir: &Path) -> UnarchiveStats;
}

/// An archive being written during one backup run
pub trait ArchiveSession {
    /// Add one selected file under its path relative to the backup root
    fn add_file(&mut self, file: &SelectedFile) -> Result<()>;

    /// Finalize and return the produced blobs in order
    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>>;
}

/// Outcome of extracting a set of blobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnarchiveStats {
    pub extracted: usize,
    pub failed: usize,
}

impl ArchiverConfig {
    /// Create the archiver described by this configuration
    pub fn build(&self) -> Box<dyn Archiver> {
        match *self {
            ArchiverConfig::TarGzip => Box::new(TarGzArchiver::new()),
            ArchiverConfig::Zip {
                multi_volume,
                volume_size,
            } => Box::new(ZipArchiver::new(multi_volume, volume_size)),
            ArchiverConfig::Null => Box::new(NullArchiver::new()),
        }
    }
}

/// Prepare `<temp_dir>/<name>`: create the directory and drop any stale output
fn prepare_output(temp_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(temp_dir)
        .with_context(|| format!("Failed to create temporary directory {:?}", temp_dir))?;

    let output = temp_dir.join(name);
    if output.exists() {
        info!("Archive output {:?} exists. Deleting...", output);
        remove_path(&output)
            .with_context(|| format!("Failed to delete existing archive output {:?}", output))?;
    }

    Ok(output)
}

/// Shared extraction loop: extract each blob, then optionally delete it
fn unarchive_each<F>(
    archives: &[PathBuf],
    target_dir: &Path,
    delete_after: bool,
    extract: F,
) -> UnarchiveStats
where
    F: Fn(&Path, &Path) -> Result<()>,
{
    let mut stats = UnarchiveStats::default();

    if let Err(e) = fs::create_dir_all(target_dir) {
        warn!("Could not create extraction directory {:?}: {}", target_dir, e);
        stats.failed = archives.len();
        return stats;
    }

    for archive in archives {
        info!("Extracting files from {:?} to {:?}", archive, target_dir);
        match extract(archive, target_dir) {
            Ok(()) => stats.extracted += 1,
            Err(e) => {
                warn!("Could not extract from {:?}: {:#}", archive, e);
                stats.failed += 1;
            }
        }

        if delete_after {
            info!("Deleting {:?}", archive);
            if let Err(e) = remove_path(archive) {
                warn!("Could not delete {:?}: {}", archive, e);
            }
        }
    }

    stats
}
