//! Destinations replicate backups to storage and bring them back
//!
//! Every destination derives its list of backups purely from what it has in
//! storage: manifests are found by extension, and a backup's blobs by the
//! timestamp marker in their names.

mod local;
pub mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use local::LocalDirectory;
#[cfg(feature = "s3")]
pub use s3::S3Destination;

use crate::config::{DestinationConfig, DestinationKind};
use crate::manifest::BackupManifest;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Suffix of files still being copied into a local destination
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

/// Result of replicating one backup to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Every blob and the manifest were written
    Stored,
    /// Nothing was written (disabled, or storage missing/unreachable)
    Skipped(String),
}

/// A storage backend for backups
pub trait Destination: Send + Sync {
    /// Configuration this destination was built from
    fn config(&self) -> &DestinationConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    /// Verify the backing store exists and is reachable
    fn check_connectivity(&self) -> Result<()>;

    /// Copy every blob and then the manifest into this destination
    fn store_backup(&self, archives: &[PathBuf], manifest_file: &Path) -> Result<StoreOutcome>;

    /// All manifests stored here, oldest first
    fn available_backups(&self) -> Result<Vec<BackupManifest>>;

    /// Copy the blobs of `manifest` into `temp_dir`, returning the local copies
    fn retrieve_backup(&self, manifest: &BackupManifest, temp_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Delete the blobs and manifest of `manifest`, returning how many entries went
    fn delete_backup_files(&self, manifest: &BackupManifest) -> Result<usize>;
}

impl DestinationConfig {
    /// Create the destination described by this configuration
    pub fn build(&self) -> Result<Box<dyn Destination>> {
        match self.kind {
            DestinationKind::Local { .. } => Ok(Box::new(LocalDirectory::new(self.clone())?)),
            #[cfg(feature = "s3")]
            DestinationKind::S3 { .. } => Ok(Box::new(S3Destination::new(self.clone())?)),
            #[cfg(not(feature = "s3"))]
            DestinationKind::S3 { .. } => anyhow::bail!(
                "Destination '{}' needs S3 support, which was not compiled in",
                self.name
            ),
        }
    }
}

/// True for entries that hold blobs of `manifest`
pub(crate) fn is_blob_of(manifest: &BackupManifest, name: &str) -> bool {
    manifest.owns(name)
        && !crate::manifest::is_manifest_name(name)
        && !name.ends_with(PARTIAL_SUFFIX)
}

/// Parse raw manifest records, skipping any that cannot be read
pub(crate) fn parse_manifests<I>(config: &DestinationConfig, records: I) -> Vec<BackupManifest>
where
    I: IntoIterator<Item = (String, Result<Vec<u8>>)>,
{
    let mut manifests: Vec<BackupManifest> = records
        .into_iter()
        .filter_map(|(name, bytes)| {
            match bytes.and_then(|b| BackupManifest::from_slice(&b)) {
                Ok(manifest) => Some(manifest.with_destination(config.clone())),
                Err(e) => {
                    warn!(
                        "Skipping unreadable manifest {} at '{}': {:#}",
                        name, config.name, e
                    );
                    None
                }
            }
        })
        .collect();

    manifests.sort_by_key(|m| m.timestamp());
    manifests
}
