//! Recording destination for tests.
//!
//! Storage is a real [`LocalDirectory`]; the mock records every call and can
//! be told to fail individual operations.

use super::{Destination, LocalDirectory, StoreOutcome};
use crate::config::DestinationConfig;
use crate::manifest::BackupManifest;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Recorded operation call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestinationCall {
    CheckConnectivity,
    Store { archives: Vec<PathBuf> },
    List,
    Retrieve { marker: String },
    Delete { marker: String },
}

/// Mock destination for testing
#[derive(Clone)]
pub struct MockDestination {
    inner: LocalDirectory,
    /// Recorded operation calls
    pub calls: Arc<Mutex<Vec<DestinationCall>>>,
    /// Whether store_backup should fail
    pub should_fail_store: Arc<Mutex<bool>>,
    /// Whether available_backups should fail
    pub should_fail_list: Arc<Mutex<bool>>,
    /// Whether delete_backup_files should fail
    pub should_fail_delete: Arc<Mutex<bool>>,
}

impl MockDestination {
    /// Mock backed by the local directory `path`
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalDirectory::at(name, path),
            calls: Arc::default(),
            should_fail_store: Arc::default(),
            should_fail_list: Arc::default(),
            should_fail_delete: Arc::default(),
        }
    }

    /// Configure store_backup to fail
    pub fn with_failing_store(self) -> Self {
        *self.should_fail_store.lock().unwrap() = true;
        self
    }

    /// Configure available_backups to fail
    pub fn with_failing_list(self) -> Self {
        *self.should_fail_list.lock().unwrap() = true;
        self
    }

    /// Configure delete_backup_files to fail
    pub fn with_failing_delete(self) -> Self {
        *self.should_fail_delete.lock().unwrap() = true;
        self
    }

    /// Directory holding the stored backups
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<DestinationCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of successful or attempted stores
    pub fn store_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, DestinationCall::Store { .. }))
            .count()
    }

    /// Check if delete_backup_files was called
    pub fn delete_called(&self) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, DestinationCall::Delete { .. }))
    }

    fn record_call(&self, call: DestinationCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Destination for MockDestination {
    fn config(&self) -> &DestinationConfig {
        self.inner.config()
    }

    fn check_connectivity(&self) -> Result<()> {
        self.record_call(DestinationCall::CheckConnectivity);
        self.inner.check_connectivity()
    }

    fn store_backup(&self, archives: &[PathBuf], manifest_file: &Path) -> Result<StoreOutcome> {
        self.record_call(DestinationCall::Store {
            archives: archives.to_vec(),
        });
        if *self.should_fail_store.lock().unwrap() {
            anyhow::bail!("Mock store failure");
        }
        self.inner.store_backup(archives, manifest_file)
    }

    fn available_backups(&self) -> Result<Vec<BackupManifest>> {
        self.record_call(DestinationCall::List);
        if *self.should_fail_list.lock().unwrap() {
            anyhow::bail!("Mock list failure");
        }
        self.inner.available_backups()
    }

    fn retrieve_backup(&self, manifest: &BackupManifest, temp_dir: &Path) -> Result<Vec<PathBuf>> {
        self.record_call(DestinationCall::Retrieve {
            marker: manifest.file_name_base(),
        });
        self.inner.retrieve_backup(manifest, temp_dir)
    }

    fn delete_backup_files(&self, manifest: &BackupManifest) -> Result<usize> {
        self.record_call(DestinationCall::Delete {
            marker: manifest.file_name_base(),
        });
        if *self.should_fail_delete.lock().unwrap() {
            anyhow::bail!("Mock delete failure");
        }
        self.inner.delete_backup_files(manifest)
    }
}
