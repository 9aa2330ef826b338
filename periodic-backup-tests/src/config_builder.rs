//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible
//! defaults. Every directory lives in the builder's temp directory.

use crate::fixtures::create_sample_tree;
use periodic_backup::config::{
    ArchiverConfig, Config, DestinationConfig, DestinationKind, GlobalConfig, SelectionSettings,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    selection: SelectionSettings,
    archiver: ArchiverConfig,
    destinations: BTreeMap<String, DestinationConfig>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with an empty root and no destinations
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).expect("Failed to create root");

        let temp_directory = temp_dir.path().join("work");
        fs::create_dir_all(&temp_directory).expect("Failed to create work dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let global = GlobalConfig {
            root,
            temp_directory,
            cron: "0 8 * * *".to_string(),
            cycle_quantity: 0,
            cycle_days: 0,
            log_directory,
            log_level: "info".to_string(),
            log_max_files: 5,
            reload_command: None,
        };

        Self {
            temp_dir,
            global,
            selection: SelectionSettings::default(),
            archiver: ArchiverConfig::TarGzip,
            destinations: BTreeMap::new(),
        }
    }

    /// Create a config with one local destination named "local"
    pub fn minimal() -> Self {
        let builder = Self::new();
        let backup_path = builder.temp_dir.path().join("backups");
        fs::create_dir_all(&backup_path).expect("Failed to create backup dir");
        builder.add_local_destination("local", &backup_path)
    }

    /// Fill the root with the sample tree
    pub fn with_sample_tree(self) -> Self {
        create_sample_tree(&self.global.root);
        self
    }

    pub fn with_includes(mut self, includes: &str) -> Self {
        self.selection.includes = Some(includes.to_string());
        self
    }

    pub fn with_excludes(mut self, excludes: &str) -> Self {
        self.selection.excludes = Some(excludes.to_string());
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.selection.follow_symlinks = follow;
        self
    }

    pub fn with_archiver(mut self, archiver: ArchiverConfig) -> Self {
        self.archiver = archiver;
        self
    }

    /// Set the retention thresholds (0 = unlimited)
    pub fn with_retention(mut self, cycle_quantity: u32, cycle_days: u32) -> Self {
        self.global.cycle_quantity = cycle_quantity;
        self.global.cycle_days = cycle_days;
        self
    }

    pub fn with_cron(mut self, cron: &str) -> Self {
        self.global.cron = cron.to_string();
        self
    }

    pub fn with_root(mut self, root: &Path) -> Self {
        self.global.root = root.to_path_buf();
        self
    }

    /// Add a local destination
    pub fn add_local_destination(mut self, name: &str, path: &Path) -> Self {
        self.destinations.insert(
            name.to_string(),
            DestinationConfig {
                name: name.to_string(),
                enabled: true,
                kind: DestinationKind::Local {
                    path: path.to_path_buf(),
                },
            },
        );
        self
    }

    /// Add a local destination that is switched off
    pub fn add_disabled_destination(mut self, name: &str, path: &Path) -> Self {
        self = self.add_local_destination(name, path);
        if let Some(d) = self.destinations.get_mut(name) {
            d.enabled = false;
        }
        self
    }

    /// Add an S3 destination
    pub fn add_s3_destination(mut self, name: &str, bucket: &str, prefix: Option<&str>) -> Self {
        self.destinations.insert(
            name.to_string(),
            DestinationConfig {
                name: name.to_string(),
                enabled: true,
                kind: DestinationKind::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.map(str::to_string),
                    region: Some("us-east-1".to_string()),
                    credentials_profile: None,
                    endpoint_url: None,
                },
            },
        );
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn root(&self) -> &Path {
        &self.global.root
    }

    /// Get a local destination's directory
    pub fn destination_path(&self, name: &str) -> Option<PathBuf> {
        self.destinations.get(name).and_then(|d| match d.kind {
            DestinationKind::Local { ref path } => Some(path.clone()),
            _ => None,
        })
    }

    fn assemble(global: GlobalConfig, selection: SelectionSettings, archiver: ArchiverConfig, destinations: BTreeMap<String, DestinationConfig>) -> Config {
        Config {
            global,
            selection,
            archiver,
            destinations,
        }
    }

    /// Build the Config
    pub fn build(self) -> Config {
        Self::assemble(self.global, self.selection, self.archiver, self.destinations)
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        let config = Self::assemble(self.global, self.selection, self.archiver, self.destinations);
        (config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
