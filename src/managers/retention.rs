//! Retention: which backups a destination drops after a successful store

use crate::config::RetentionPolicy;
use crate::destinations::Destination;
use crate::manifest::BackupManifest;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

impl RetentionPolicy {
    /// Neither threshold is set
    pub fn is_unlimited(&self) -> bool {
        self.cycle_quantity == 0 && self.cycle_days == 0
    }

    /// Manifests to delete, newest first.
    ///
    /// A backup goes when it falls outside the newest `cycle_quantity` or is
    /// older than `cycle_days` days; a zero disables that threshold.
    pub fn expired(&self, manifests: &[BackupManifest], now: DateTime<Utc>) -> Vec<BackupManifest> {
        let mut sorted = manifests.to_vec();
        sorted.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

        let keep = self.cycle_quantity as usize;
        let cutoff = (self.cycle_days > 0).then(|| now - Duration::days(i64::from(self.cycle_days)));

        sorted
            .into_iter()
            .enumerate()
            .filter(|(index, manifest)| {
                let over_quantity = keep > 0 && *index >= keep;
                let too_old = cutoff.is_some_and(|cutoff| manifest.timestamp() < cutoff);
                over_quantity || too_old
            })
            .map(|(_, manifest)| manifest)
            .collect()
    }
}

/// Delete the expired backups of one destination, returning how many went
pub fn apply_retention(
    destination: &dyn Destination,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<usize> {
    if policy.is_unlimited() {
        return Ok(0);
    }

    let manifests = destination
        .available_backups()
        .with_context(|| format!("Failed to list backups in '{}'", destination.name()))?;

    let mut evicted = 0;
    for manifest in policy.expired(&manifests, now) {
        info!(
            "Deleting expired backup {} from '{}'",
            manifest.file_name_base(),
            destination.name()
        );
        match destination.delete_backup_files(&manifest) {
            Ok(_) => evicted += 1,
            Err(e) => warn!(
                "Could not delete backup {} from '{}': {:#}",
                manifest.file_name_base(),
                destination.name(),
                e
            ),
        }
    }

    Ok(evicted)
}
