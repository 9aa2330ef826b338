//! Test context and harness for pipeline testing
//!
//! Owns the temp directory holding the root, the work directory and the
//! local backup directory of one test.

use crate::config_builder::ConfigBuilder;
use crate::fixtures::snapshot_tree;
use anyhow::Result;
use periodic_backup::config::{Config, DestinationKind};
use periodic_backup::managers::backup::BackupPlan;
use periodic_backup::selection::FileSelector;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    /// The test configuration
    config: Config,
}

impl TestContext {
    /// Minimal config (one local destination) over the sample tree
    pub fn with_sample_tree() -> Self {
        Self::from_builder(ConfigBuilder::minimal().with_sample_tree())
    }

    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (config, temp_dir) = builder.persist();
        Self { temp_dir, config }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The backed up root
    pub fn root(&self) -> &Path {
        &self.config.global.root
    }

    /// The configured temp directory
    pub fn work_dir(&self) -> &Path {
        &self.config.global.temp_directory
    }

    /// Directory of a configured local destination
    pub fn destination_dir(&self, name: &str) -> PathBuf {
        match self.config.destinations.get(name).map(|d| &d.kind) {
            Some(DestinationKind::Local { path }) => path.clone(),
            other => panic!("'{}' is not a local destination: {:?}", name, other),
        }
    }

    /// Backup plan for the current config
    pub fn plan(&self) -> BackupPlan {
        BackupPlan::from_config(&self.config).expect("Failed to build backup plan")
    }

    /// Selector over the configured root
    pub fn selector(&self) -> FileSelector {
        FileSelector::from_config(&self.config.selector()).expect("Failed to build selector")
    }

    /// Create (if needed) and return the restore temp directory
    pub fn restore_dir(&self) -> PathBuf {
        self.create_subdir("work/restore")
    }

    /// Create a subdirectory in the temp dir
    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    /// Create a file below the root
    pub fn write_root_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Read a file below the root
    pub fn read_root_file(&self, relative: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root().join(relative))?)
    }

    /// Snapshot of every regular file under the root
    pub fn root_snapshot(&self) -> std::collections::BTreeMap<String, Vec<u8>> {
        snapshot_tree(self.root())
    }
}

/// Extension trait for assertion helpers
pub trait ResultAssertions<T> {
    /// Assert that the result is Ok and return the value
    fn assert_ok(self) -> T;

    /// Assert that the result is Err and its Display output contains `needle`
    fn assert_err_contains(self, needle: &str);
}

impl<T: std::fmt::Debug, E: std::fmt::Display> ResultAssertions<T> for Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {}", e),
        }
    }

    fn assert_err_contains(self, needle: &str) {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = e.to_string();
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}
