use super::{prepare_output, unarchive_each, ArchiveSession, Archiver, UnarchiveStats};
use crate::config::ArchiverConfig;
use crate::selection::SelectedFile;
use crate::utils::fs::{copy_file, copy_tree};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copies files untouched into a `<base>.null` directory.
///
/// Useful for testing the pipeline: the "blob" is the directory itself, and
/// extraction is a plain copy that leaves the source in place.
#[derive(Debug, Clone, Default)]
pub struct NullArchiver;

impl NullArchiver {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for NullArchiver {
    fn config(&self) -> ArchiverConfig {
        ArchiverConfig::Null
    }

    fn extension(&self) -> &'static str {
        "null"
    }

    fn backup_start(
        &self,
        temp_dir: &Path,
        archive_filename_base: &str,
    ) -> Result<Box<dyn ArchiveSession>> {
        let destination = prepare_output(
            temp_dir,
            &format!("{}.{}", archive_filename_base, self.extension()),
        )?;
        fs::create_dir_all(&destination)
            .with_context(|| format!("Failed to create {:?}", destination))?;

        Ok(Box::new(NullSession { destination }))
    }

    fn unarchive_files(&self, archives: &[PathBuf], target_dir: &Path) -> UnarchiveStats {
        unarchive_each(archives, target_dir, false, |archive, target| {
            if archive.is_dir() {
                let stats = copy_tree(archive, target);
                if stats.failed > 0 {
                    anyhow::bail!("{} file(s) could not be copied", stats.failed);
                }
            } else {
                let name = archive
                    .file_name()
                    .with_context(|| format!("Invalid archive path {:?}", archive))?;
                copy_file(archive, &target.join(name))
                    .with_context(|| format!("Failed to copy {:?}", archive))?;
            }
            Ok(())
        })
    }
}

struct NullSession {
    destination: PathBuf,
}

impl ArchiveSession for NullSession {
    fn add_file(&mut self, file: &SelectedFile) -> Result<()> {
        let target = self.destination.join(&file.relative);
        copy_file(&file.path, &target)
            .with_context(|| format!("Could not copy {:?} to {:?}", file.path, target))?;
        debug!("Copied {} into {:?}", file.archive_name(), self.destination);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>> {
        Ok(vec![self.destination])
    }
}
