//! Backup manifest: the metadata record stored next to every backup's blobs

use crate::config::{ArchiverConfig, DestinationConfig, SelectorConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension that marks a manifest when listing a destination
pub const MANIFEST_EXTENSION: &str = "manifest";

/// Fixed-width timestamp format used in every file name of a backup
pub const FILE_TIMESTAMP_PATTERN: &str = "%Y_%m_%d_%H_%M_%S";

const FILE_NAME_PREFIX: &str = "backup_";
const FORMAT_VERSION: u32 = 1;

/// Timestamp marker shared by a backup's blobs and manifest, e.g.
/// `backup_2026_10_19_08_00_00`
pub fn file_name_base(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        FILE_NAME_PREFIX,
        timestamp.format(FILE_TIMESTAMP_PATTERN)
    )
}

/// True for file names (or object keys) that hold a manifest
pub fn is_manifest_name(name: &str) -> bool {
    name.ends_with(&format!(".{}", MANIFEST_EXTENSION))
}

/// Describes one backup: when it was taken and how to get it back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    format_version: u32,
    timestamp: DateTime<Utc>,
    archiver: ArchiverConfig,
    selector: SelectorConfig,
    #[serde(default)]
    destination: Option<DestinationConfig>,
}

impl BackupManifest {
    /// Create a manifest for a capture time; sub-second precision is dropped
    pub fn new(timestamp: DateTime<Utc>, archiver: ArchiverConfig, selector: SelectorConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            timestamp: truncate_to_seconds(timestamp),
            archiver,
            selector,
            destination: None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn archiver(&self) -> &ArchiverConfig {
        &self.archiver
    }

    pub fn selector(&self) -> &SelectorConfig {
        &self.selector
    }

    /// Destination this manifest was listed from, if any
    pub fn destination(&self) -> Option<&DestinationConfig> {
        self.destination.as_ref()
    }

    /// Copy of this manifest tagged with the destination holding it
    pub fn with_destination(&self, destination: DestinationConfig) -> Self {
        Self {
            destination: Some(destination),
            ..self.clone()
        }
    }

    /// Timestamp marker, also used as the archive file name base
    pub fn file_name_base(&self) -> String {
        file_name_base(self.timestamp)
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_name_base(), MANIFEST_EXTENSION)
    }

    /// True if `name` belongs to this backup (blob or manifest)
    pub fn owns(&self, name: &str) -> bool {
        name.contains(&self.file_name_base())
    }

    /// Serialize into `dir`, returning the written file
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize manifest")?;
        fs::write(&path, json).with_context(|| format!("Failed to write manifest {:?}", path))?;
        Ok(path)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse manifest")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read manifest {:?}", path))?;
        Self::from_slice(&bytes).with_context(|| format!("Invalid manifest {:?}", path))
    }
}

impl fmt::Display for BackupManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;
        write!(f, " [{}]", archiver_label(&self.archiver))?;
        if let Some(ref destination) = self.destination {
            write!(f, " @ {}", destination.name)?;
        }
        Ok(())
    }
}

fn archiver_label(archiver: &ArchiverConfig) -> &'static str {
    match archiver {
        ArchiverConfig::TarGzip => "tar.gz",
        ArchiverConfig::Zip { multi_volume: true, .. } => "zip, multi-volume",
        ArchiverConfig::Zip { .. } => "zip",
        ArchiverConfig::Null => "null",
    }
}

fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}
