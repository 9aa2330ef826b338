use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub selection: SelectionSettings,
    pub archiver: ArchiverConfig,
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl Config {
    /// Selector descriptor for the configured root and rules
    pub fn selector(&self) -> SelectorConfig {
        SelectorConfig {
            root: self.global.root.clone(),
            includes: self.selection.includes.clone(),
            excludes: self.selection.excludes.clone(),
            follow_symlinks: self.selection.follow_symlinks,
        }
    }

    /// Retention window applied after each backup
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            cycle_quantity: self.global.cycle_quantity,
            cycle_days: self.global.cycle_days,
        }
    }

    /// Working directories a restore must never delete, even below the root
    pub fn protected_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.global.temp_directory.clone()];
        paths.extend(self.destinations.values().filter_map(|d| match d.kind {
            DestinationKind::Local { ref path } => Some(path.clone()),
            DestinationKind::S3 { .. } => None,
        }));
        paths
    }
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Directory tree that gets backed up and restored
    pub root: PathBuf,

    /// Scratch space for archives, retrieved blobs and restore staging
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,

    /// Cron schedule (5 fields)
    pub cron: String,

    /// Retention: keep at most this many backups (0 = unlimited)
    #[serde(default)]
    pub cycle_quantity: u32,
    /// Retention: drop backups older than this many days (0 = unlimited)
    #[serde(default)]
    pub cycle_days: u32,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,

    /// Shell command run after a restore to make the host reload its files
    #[serde(default)]
    pub reload_command: Option<String>,
}

/// Include/exclude rules as written in the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SelectionSettings {
    #[serde(default)]
    pub includes: Option<String>,
    #[serde(default)]
    pub excludes: Option<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

/// Everything needed to rebuild a file selector; recorded in each manifest
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct SelectorConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub includes: Option<String>,
    #[serde(default)]
    pub excludes: Option<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

/// Archive format used to package a backup
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiverConfig {
    TarGzip,
    Zip {
        #[serde(default)]
        multi_volume: bool,
        /// Maximum uncompressed bytes per volume
        #[serde(default)]
        volume_size: u64,
    },
    Null,
}

/// Backup destination configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct DestinationConfig {
    /// Filled in from the `[destinations.<name>]` key when loading
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: DestinationKind,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationKind {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        region: Option<String>,
        /// AWS profile name used to resolve credentials
        #[serde(default)]
        credentials_profile: Option<String>,
        /// S3-compatible endpoint (MinIO, LocalStack, ...)
        #[serde(default)]
        endpoint_url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub cycle_quantity: u32,
    pub cycle_days: u32,
}

// Default value functions

fn default_temp_directory() -> PathBuf { std::env::temp_dir().join("periodic-backup") }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_enabled() -> bool { true }
