//! Restore executor - brings a stored backup back into the live root

use crate::managers::host::{HostHooks, RestartSuspension, StatusMessage};
use crate::manifest::BackupManifest;
use crate::selection::{FileSelector, RestoreStats};
use crate::utils::fs::{is_empty_dir, is_writable_dir, remove_path};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Staging directory for extracted files, inside the restore temp directory
pub const FINAL_RESULT_DIR: &str = "finalResult";

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("Temporary directory {0:?} is not a writable directory")]
    TempNotWritable(PathBuf),

    #[error("Could not prepare staging directory {path:?}: {source}")]
    FinalResult {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Backup {0} does not say which destination holds it")]
    NoDestination(String),
}

/// Summary of one restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub blobs_retrieved: usize,
    pub blobs_extracted: usize,
    pub blobs_failed: usize,
    /// `None` when nothing was extracted and the live root was left alone
    pub replaced: Option<RestoreStats>,
    pub reloaded: bool,
}

pub struct RestoreExecutor {
    selector: FileSelector,
    host: Arc<dyn HostHooks>,
    protected: Vec<PathBuf>,
}

impl RestoreExecutor {
    /// `selector` decides which live root gets replaced
    pub fn new(selector: FileSelector, host: Arc<dyn HostHooks>) -> Self {
        Self {
            selector,
            host,
            protected: Vec::new(),
        }
    }

    /// Paths left in place when the root is cleared, besides the restore temp directory
    pub fn with_protected_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.protected.extend(paths);
        self
    }

    /// Run [`RestoreExecutor::run_restore`] on its own thread
    pub fn spawn(
        self,
        manifest: BackupManifest,
        temp_dir: PathBuf,
    ) -> io::Result<JoinHandle<Result<RestoreReport, RestoreError>>> {
        thread::Builder::new()
            .name("periodic-backup-restore".to_string())
            .spawn(move || self.run_restore(&manifest, &temp_dir))
    }

    /// Retrieve, extract and swap in the backup described by `manifest`.
    ///
    /// Failures to retrieve or extract are logged and leave the live root
    /// untouched; only an unusable temp directory or a manifest without a
    /// destination is an error.
    pub fn run_restore(
        &self,
        manifest: &BackupManifest,
        temp_dir: &Path,
    ) -> Result<RestoreReport, RestoreError> {
        let _suspension = RestartSuspension::new(self.host.as_ref());
        let _status = StatusMessage::new(self.host.as_ref(), "Restoring backup...");
        info!("Starting restore of {}", manifest);

        if !temp_dir.is_dir() || !is_writable_dir(temp_dir) {
            error!("Restore temporary directory {:?} is not usable", temp_dir);
            return Err(RestoreError::TempNotWritable(temp_dir.to_path_buf()));
        }

        let final_result = temp_dir.join(FINAL_RESULT_DIR);
        prepare_final_result(&final_result).map_err(|source| RestoreError::FinalResult {
            path: final_result.clone(),
            source,
        })?;

        let destination_config = manifest
            .destination()
            .ok_or_else(|| RestoreError::NoDestination(manifest.file_name_base()))?;

        let mut report = RestoreReport::default();

        let blobs = match destination_config
            .build()
            .and_then(|destination| destination.retrieve_backup(manifest, temp_dir))
        {
            Ok(blobs) => blobs,
            Err(e) => {
                error!(
                    "Could not retrieve backup {} from '{}': {:#}",
                    manifest.file_name_base(),
                    destination_config.name,
                    e
                );
                Vec::new()
            }
        };
        report.blobs_retrieved = blobs.len();

        let archiver = manifest.archiver().build();
        let stats = archiver.unarchive_files(&blobs, &final_result);
        report.blobs_extracted = stats.extracted;
        report.blobs_failed = stats.failed;

        // Null blobs are directories the archiver copies from and leaves behind
        for blob in &blobs {
            if let Err(e) = remove_path(blob) {
                warn!("Could not remove retrieved blob {:?}: {}", blob, e);
            }
        }

        match is_empty_dir(&final_result) {
            Ok(false) => {
                let protected: Vec<&Path> = std::iter::once(temp_dir)
                    .chain(self.protected.iter().map(PathBuf::as_path))
                    .collect();
                let stats = self.selector.restore_files(&final_result, &protected);
                report.replaced = Some(stats);
            }
            Ok(true) => warn!(
                "Nothing was extracted from {}; leaving {:?} untouched",
                manifest.file_name_base(),
                self.selector.root()
            ),
            Err(e) => warn!("Could not inspect {:?}: {}", final_result, e),
        }

        match self.host.reload_configuration() {
            Ok(()) => report.reloaded = true,
            Err(e) => error!("Could not reload configuration after restore: {:#}", e),
        }

        info!(
            "Restore of {} finished: {} blob(s) retrieved, {} extracted, {} failed",
            manifest.file_name_base(),
            report.blobs_retrieved,
            report.blobs_extracted,
            report.blobs_failed
        );
        Ok(report)
    }
}

/// Empty `path` of anything a previous restore left, then recreate it
fn prepare_final_result(path: &Path) -> io::Result<()> {
    if path.exists() {
        info!("Deleting stale restore staging {:?}", path);
        remove_path(path)?;
    }
    fs::create_dir_all(path)
}
