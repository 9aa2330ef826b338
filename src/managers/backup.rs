//! Backup executor - orchestrates one backup run end to end

use crate::archivers::Archiver;
use crate::config::{Config, RetentionPolicy};
use crate::destinations::{Destination, StoreOutcome};
use crate::managers::host::{HostHooks, StatusMessage};
use crate::managers::retention::apply_retention;
use crate::manifest::{file_name_base, BackupManifest};
use crate::selection::{FileSelector, SelectionError};
use crate::utils::fs::remove_path;
use anyhow::Context;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

static BACKUP_IN_PROGRESS: AtomicBool = AtomicBool::new(false);
static LAST_CAPTURE: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("A backup is already in progress")]
    AlreadyInProgress,

    #[error("File selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("Archiving failed: {0:#}")]
    Archive(anyhow::Error),

    #[error("Backup failed: {0:#}")]
    Other(anyhow::Error),
}

/// Process-wide "a backup is running" flag, released on drop
#[derive(Debug)]
pub struct BackupGuard {
    _private: (),
}

impl BackupGuard {
    pub fn try_acquire() -> Option<Self> {
        BACKUP_IN_PROGRESS
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { _private: () })
    }

    pub fn is_held() -> bool {
        BACKUP_IN_PROGRESS.load(Ordering::Acquire)
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        BACKUP_IN_PROGRESS.store(false, Ordering::Release);
    }
}

/// Everything one backup run needs
pub struct BackupPlan {
    pub selector: FileSelector,
    pub archiver: Box<dyn Archiver>,
    pub destinations: Vec<Box<dyn Destination>>,
    /// Scratch directory for blobs; must not be shared with a restore
    pub temp_dir: PathBuf,
    pub retention: RetentionPolicy,
}

impl BackupPlan {
    /// Build the plan described by a loaded configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let selector = config.selector().build()?;
        let destinations = config
            .destinations
            .values()
            .map(|d| {
                d.build()
                    .with_context(|| format!("Failed to set up destination '{}'", d.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            selector,
            archiver: config.archiver.build(),
            destinations,
            temp_dir: config.global.temp_directory.join("backup"),
            retention: config.retention(),
        })
    }
}

/// What happened at one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationReport {
    pub name: String,
    /// `None` when storing failed
    pub outcome: Option<StoreOutcome>,
    /// Backups removed by retention
    pub evicted: usize,
    pub error: Option<String>,
}

impl DestinationReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub timestamp: DateTime<Utc>,
    pub files_selected: usize,
    /// Files that could not be added to the archive
    pub files_skipped: usize,
    /// File names of the produced blobs
    pub blobs: Vec<String>,
    pub destinations: Vec<DestinationReport>,
}

impl BackupReport {
    pub fn all_succeeded(&self) -> bool {
        self.destinations.iter().all(DestinationReport::succeeded)
    }

    pub fn stored_count(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.outcome == Some(StoreOutcome::Stored))
            .count()
    }
}

pub struct BackupExecutor {
    host: Arc<dyn HostHooks>,
}

impl BackupExecutor {
    pub fn new(host: Arc<dyn HostHooks>) -> Self {
        Self { host }
    }

    /// Run one backup: select, archive, replicate, apply retention
    pub fn run_backup(&self, plan: &BackupPlan) -> Result<BackupReport, BackupError> {
        let _guard = BackupGuard::try_acquire().ok_or(BackupError::AlreadyInProgress)?;
        let _status = StatusMessage::new(self.host.as_ref(), "Creating backup...");
        let start_time = Instant::now();

        let timestamp = capture_timestamp(Utc::now());
        let base = file_name_base(timestamp);
        info!("Starting backup {}", base);

        let files = plan.selector.select()?;

        // Removes whatever this run left in the temp directory, on every path
        let _cleanup = TempCleanup {
            dir: &plan.temp_dir,
            base: &base,
        };

        let mut session = plan
            .archiver
            .backup_start(&plan.temp_dir, &base)
            .map_err(BackupError::Archive)?;

        let mut files_skipped = 0;
        for file in &files {
            if let Err(e) = session.add_file(file) {
                warn!("Skipping {:?}: {:#}", file.path, e);
                files_skipped += 1;
            }
        }
        let blobs = session.finish().map_err(BackupError::Archive)?;

        let manifest = BackupManifest::new(timestamp, plan.archiver.config(), plan.selector.config());
        let manifest_file = manifest
            .write_to(&plan.temp_dir)
            .map_err(BackupError::Other)?;

        let now = Utc::now();
        let destinations = plan
            .destinations
            .iter()
            .map(|destination| {
                self.replicate(destination.as_ref(), &blobs, &manifest_file, &plan.retention, now)
            })
            .collect::<Vec<_>>();

        let report = BackupReport {
            timestamp,
            files_selected: files.len(),
            files_skipped,
            blobs: blobs
                .iter()
                .filter_map(|b| b.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
            destinations,
        };

        info!(
            "Backup {} completed in {:.2}s: {} files, {} skipped, stored in {}/{} destination(s)",
            base,
            start_time.elapsed().as_secs_f64(),
            report.files_selected,
            report.files_skipped,
            report.stored_count(),
            report.destinations.len()
        );

        Ok(report)
    }

    /// Store into one destination and apply retention if that succeeded
    fn replicate(
        &self,
        destination: &dyn Destination,
        blobs: &[PathBuf],
        manifest_file: &Path,
        retention: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> DestinationReport {
        let mut report = DestinationReport {
            name: destination.name().to_string(),
            outcome: None,
            evicted: 0,
            error: None,
        };

        if !destination.is_enabled() {
            info!("Destination '{}' is disabled, skipping", report.name);
            report.outcome = Some(StoreOutcome::Skipped("disabled".to_string()));
            return report;
        }

        match destination.store_backup(blobs, manifest_file) {
            Ok(outcome) => report.outcome = Some(outcome),
            Err(e) => {
                error!("Failed to store backup in '{}': {:#}", report.name, e);
                report.error = Some(format!("{:#}", e));
                return report;
            }
        }

        if report.outcome == Some(StoreOutcome::Stored) {
            match apply_retention(destination, retention, now) {
                Ok(evicted) => report.evicted = evicted,
                Err(e) => {
                    error!("Retention failed for '{}': {:#}", report.name, e);
                    report.error = Some(format!("retention: {:#}", e));
                }
            }
        }

        report
    }
}

/// Capture time in whole seconds, strictly later than any earlier capture
fn capture_timestamp(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut last = LAST_CAPTURE.lock().unwrap_or_else(PoisonError::into_inner);
    let timestamp = next_capture(*last, now);
    *last = Some(timestamp);
    timestamp
}

fn next_capture(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let timestamp = now.with_nanosecond(0).unwrap_or(now);
    match previous {
        Some(previous) if timestamp <= previous => previous + Duration::seconds(1),
        _ => timestamp,
    }
}

/// Deletes the entries of one backup from the temp directory on drop
struct TempCleanup<'a> {
    dir: &'a Path,
    base: &'a str,
}

impl Drop for TempCleanup<'_> {
    fn drop(&mut self) {
        let Ok(entries) = fs::read_dir(self.dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_name().to_string_lossy().contains(self.base) {
                continue;
            }
            match remove_path(&entry.path()) {
                Ok(()) => debug!("Removed temporary {:?}", entry.path()),
                Err(e) => warn!("Could not remove temporary {:?}: {}", entry.path(), e),
            }
        }
    }
}
