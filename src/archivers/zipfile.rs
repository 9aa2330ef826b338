use super::{prepare_output, unarchive_each, ArchiveSession, Archiver, UnarchiveStats};
use crate::config::ArchiverConfig;
use crate::selection::SelectedFile;
use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Deflate-compressed zip, optionally split into several volumes.
///
/// Volumes are independent zip files named `<base>.partNNN.zip`; each can be
/// extracted on its own. A new volume is started before a file whose
/// uncompressed size would push a non-empty volume past `volume_size`.
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    multi_volume: bool,
    volume_size: u64,
}

impl ZipArchiver {
    pub fn new(multi_volume: bool, volume_size: u64) -> Self {
        Self {
            multi_volume,
            volume_size,
        }
    }

    pub fn single() -> Self {
        Self::new(false, 0)
    }

    fn splits(&self) -> bool {
        self.multi_volume && self.volume_size > 0
    }
}

impl Archiver for ZipArchiver {
    fn config(&self) -> ArchiverConfig {
        ArchiverConfig::Zip {
            multi_volume: self.multi_volume,
            volume_size: self.volume_size,
        }
    }

    fn extension(&self) -> &'static str {
        "zip"
    }

    fn backup_start(
        &self,
        temp_dir: &Path,
        archive_filename_base: &str,
    ) -> Result<Box<dyn ArchiveSession>> {
        let mut session = ZipSession {
            temp_dir: temp_dir.to_path_buf(),
            base: archive_filename_base.to_string(),
            volume_size: self.splits().then_some(self.volume_size),
            writer: None,
            current_bytes: 0,
            current_entries: 0,
            volumes: Vec::new(),
        };
        session.open_volume()?;
        Ok(Box::new(session))
    }

    fn unarchive_files(&self, archives: &[PathBuf], target_dir: &Path) -> UnarchiveStats {
        unarchive_each(archives, target_dir, true, |archive, target| {
            let file = File::open(archive)
                .with_context(|| format!("Failed to open {:?}", archive))?;
            let mut zip = ZipArchive::new(file)
                .with_context(|| format!("Failed to read zip archive {:?}", archive))?;
            zip.extract(target)
                .with_context(|| format!("Failed to extract {:?}", archive))
        })
    }
}

struct ZipSession {
    temp_dir: PathBuf,
    base: String,
    /// Set when splitting into volumes
    volume_size: Option<u64>,
    writer: Option<ZipWriter<File>>,
    current_bytes: u64,
    current_entries: usize,
    volumes: Vec<PathBuf>,
}

impl ZipSession {
    fn volume_name(&self, index: usize) -> String {
        match self.volume_size {
            Some(_) => format!("{}.part{:03}.zip", self.base, index),
            None => format!("{}.zip", self.base),
        }
    }

    fn open_volume(&mut self) -> Result<()> {
        let name = self.volume_name(self.volumes.len() + 1);
        let path = prepare_output(&self.temp_dir, &name)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create archive {:?}", path))?;

        info!("Started zip volume {:?}", path);
        self.writer = Some(ZipWriter::new(file));
        self.volumes.push(path);
        self.current_bytes = 0;
        self.current_entries = 0;
        Ok(())
    }

    fn close_volume(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.finish().context("Failed to finalize zip volume")?;
            file.sync_all().context("Failed to flush zip volume")?;
        }
        Ok(())
    }
}

impl ArchiveSession for ZipSession {
    fn add_file(&mut self, file: &SelectedFile) -> Result<()> {
        let mut source = File::open(&file.path)
            .with_context(|| format!("Failed to open {:?}", file.path))?;
        let metadata = source
            .metadata()
            .with_context(|| format!("Failed to stat {:?}", file.path))?;
        let len = metadata.len();

        if let Some(limit) = self.volume_size {
            if self.current_entries > 0 && self.current_bytes + len > limit {
                self.close_volume()?;
                self.open_volume()?;
            }
        }

        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(len >= u64::from(u32::MAX));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(metadata.permissions().mode());
        }

        let writer = self
            .writer
            .as_mut()
            .context("Zip volume is not open")?;
        writer
            .start_file(file.archive_name(), options)
            .with_context(|| format!("Failed to start zip entry for {:?}", file.path))?;

        if let Err(e) = io::copy(&mut source, writer) {
            if let Err(abort) = writer.abort_file() {
                warn!("Could not discard partial zip entry: {}", abort);
            }
            return Err(e).with_context(|| format!("Failed to copy {:?} into zip", file.path));
        }

        self.current_bytes += len;
        self.current_entries += 1;
        debug!("Added {} to zip volume {}", file.archive_name(), self.volumes.len());
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<PathBuf>> {
        self.close_volume()?;
        info!("Created {} zip volume(s) for {}", self.volumes.len(), self.base);
        Ok(std::mem::take(&mut self.volumes))
    }
}
