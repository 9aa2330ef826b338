use super::{is_blob_of, parse_manifests, Destination, StoreOutcome, PARTIAL_SUFFIX};
use crate::config::{DestinationConfig, DestinationKind};
use crate::manifest::{is_manifest_name, BackupManifest};
use crate::utils::fs::{copy_dir_all, is_writable_dir, remove_path};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A directory on a locally mounted filesystem
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    config: DestinationConfig,
    path: PathBuf,
}

impl LocalDirectory {
    pub fn new(config: DestinationConfig) -> Result<Self> {
        let path = match config.kind {
            DestinationKind::Local { ref path } => path.clone(),
            _ => anyhow::bail!("Destination '{}' is not a local directory", config.name),
        };
        Ok(Self { config, path })
    }

    /// Enabled local destination at `path`
    pub fn at(name: &str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            config: DestinationConfig {
                name: name.to_string(),
                enabled: true,
                kind: DestinationKind::Local { path: path.clone() },
            },
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File names in the directory, sorted
    fn entry_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.path)
            .with_context(|| format!("Failed to list {:?}", self.path))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Copy `source` in under a `.partial` name; records what it wrote
    fn copy_partial(&self, source: &Path, written: &mut Vec<PathBuf>) -> Result<(PathBuf, PathBuf)> {
        let name = source
            .file_name()
            .with_context(|| format!("Invalid blob path {:?}", source))?;
        let target = self.path.join(name);
        let partial = self
            .path
            .join(format!("{}{}", name.to_string_lossy(), PARTIAL_SUFFIX));

        written.push(partial.clone());
        remove_path(&partial)?;
        if source.is_dir() {
            copy_dir_all(source, &partial)
        } else {
            fs::copy(source, &partial)
        }
        .with_context(|| format!("Failed to copy {:?} to {:?}", source, partial))?;

        Ok((partial, target))
    }

    fn commit(partial: &Path, target: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
        remove_path(target)?;
        fs::rename(partial, target)
            .with_context(|| format!("Failed to move {:?} into place", partial))?;
        written.push(target.to_path_buf());
        Ok(())
    }

    fn copy_all(&self, archives: &[PathBuf], manifest_file: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
        let mut staged = Vec::new();
        for archive in archives {
            info!("Copying {:?} to {:?}", archive, self.path);
            staged.push(self.copy_partial(archive, written)?);
        }
        for (partial, target) in staged {
            Self::commit(&partial, &target, written)?;
        }

        // The manifest goes last so a listed backup always has its blobs
        let (partial, target) = self.copy_partial(manifest_file, written)?;
        Self::commit(&partial, &target, written)?;
        Ok(())
    }
}

impl Destination for LocalDirectory {
    fn config(&self) -> &DestinationConfig {
        &self.config
    }

    fn check_connectivity(&self) -> Result<()> {
        if !is_writable_dir(&self.path) {
            anyhow::bail!("{:?} is not a writable directory", self.path);
        }
        Ok(())
    }

    fn store_backup(&self, archives: &[PathBuf], manifest_file: &Path) -> Result<StoreOutcome> {
        if !self.config.enabled {
            warn!("Skipping location '{}' since it is disabled", self.config.name);
            return Ok(StoreOutcome::Skipped("disabled".to_string()));
        }
        if !self.path.is_dir() {
            warn!(
                "Skipping location '{}' since {:?} does not exist",
                self.config.name, self.path
            );
            return Ok(StoreOutcome::Skipped(format!("{:?} does not exist", self.path)));
        }

        let mut written = Vec::new();
        match self.copy_all(archives, manifest_file, &mut written) {
            Ok(()) => {
                info!("Stored backup in '{}' ({:?})", self.config.name, self.path);
                Ok(StoreOutcome::Stored)
            }
            Err(e) => {
                for path in written.iter().rev() {
                    if let Err(cleanup) = remove_path(path) {
                        warn!("Could not remove {:?} after failed copy: {}", path, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn available_backups(&self) -> Result<Vec<BackupManifest>> {
        let records = self
            .entry_names()?
            .into_iter()
            .filter(|name| is_manifest_name(name))
            .map(|name| {
                let bytes = fs::read(self.path.join(&name))
                    .with_context(|| format!("Failed to read {}", name));
                (name, bytes)
            })
            .collect::<Vec<_>>();

        Ok(parse_manifests(&self.config, records))
    }

    fn retrieve_backup(&self, manifest: &BackupManifest, temp_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(temp_dir)
            .with_context(|| format!("Failed to create {:?}", temp_dir))?;

        let mut retrieved = Vec::new();
        for name in self.entry_names()? {
            if !is_blob_of(manifest, &name) {
                continue;
            }

            let source = self.path.join(&name);
            let target = temp_dir.join(&name);
            debug!("Copying from {:?} to {:?}", source, target);

            let result = remove_path(&target).and_then(|_| {
                if source.is_dir() {
                    copy_dir_all(&source, &target)
                } else {
                    fs::copy(&source, &target)
                }
            });

            match result {
                Ok(_) => retrieved.push(target),
                Err(e) => warn!("Could not retrieve {:?}: {}", source, e),
            }
        }

        info!(
            "Retrieved {} blob(s) for {} from '{}'",
            retrieved.len(),
            manifest.file_name_base(),
            self.config.name
        );
        Ok(retrieved)
    }

    fn delete_backup_files(&self, manifest: &BackupManifest) -> Result<usize> {
        info!("Deleting backup {} from '{}'", manifest.file_name_base(), self.config.name);

        let mut deleted = 0;
        for name in self.entry_names()? {
            if !manifest.owns(&name) {
                continue;
            }
            let path = self.path.join(&name);
            match remove_path(&path) {
                Ok(()) => {
                    debug!("Deleted {:?}", path);
                    deleted += 1;
                }
                Err(e) => warn!("Could not delete {:?}: {}", path, e),
            }
        }
        Ok(deleted)
    }
}
