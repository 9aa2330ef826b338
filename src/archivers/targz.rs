use super::{prepare_output, unarchive_each, ArchiveSession, Archiver, UnarchiveStats};
use crate::config::ArchiverConfig;
use crate::selection::SelectedFile;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Gzip-compressed tarball, one blob per backup
#[derive(Debug, Clone, Default)]
pub struct TarGzArchiver;

impl TarGzArchiver {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for TarGzArchiver {
    fn config(&self) -> ArchiverConfig {
        ArchiverConfig::TarGzip
    }

    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    fn backup_start(
        &self,
        temp_dir: &Path,
        archive_filename_base: &str,
    ) -> Result<Box<dyn ArchiveSession>> {
        let path = prepare_output(
            temp_dir,
            &format!("{}.{}", archive_filename_base, self.extension()),
        )?;

        let file = File::create(&path)
            .with_context(|| format!("Failed to create archive {:?}", path))?;
        let builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        info!("Started tar.gz archive {:?}", path);
        Ok(Box::new(TarGzSession { path, builder }))
    }

    fn unarchive_files(&self, archives: &[PathBuf], target_dir: &Path) -> UnarchiveStats {
        unarchive_each(archives, target_dir, true, |archive, target| {
            let file = File::open(archive)
                .with_context(|| format!("Failed to open {:?}", archive))?;
            let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
            tarball
                .unpack(target)
                .with_context(|| format!("Failed to unpack {:?}", archive))
        })
    }
}

struct TarGzSession {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<File>>,
}

impl ArchiveSession for TarGzSession {
    fn add_file(&mut self, file: &SelectedFile) -> Result<()> {
        let source = File::open(&file.path)
            .with_context(|| format!("Failed to open {:?}", file.path))?;
        let metadata = source
            .metadata()
            .with_context(|| format!("Failed to stat {:?}", file.path))?;

        let mut header = tar::Header::new_gnu();
        header.set_metadata(&metadata);

        let padded = append_sized(&mut self.builder, &file.archive_name(), header, source)
            .with_context(|| format!("Failed to add {:?} to {:?}", file.path, self.path))?;
        if padded > 0 {
            warn!(
                "{:?} shrank while being archived; padded {} missing bytes",
                file.path, padded
            );
        }
        debug!("Added {} to tar.gz archive", file.archive_name());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>> {
        let TarGzSession { path, builder } = *self;

        let encoder = builder
            .into_inner()
            .with_context(|| format!("Failed to finalize tar stream {:?}", path))?;
        let file = encoder
            .finish()
            .with_context(|| format!("Failed to finish gzip stream {:?}", path))?;
        file.sync_all()
            .with_context(|| format!("Failed to flush archive {:?}", path))?;

        info!("Created archive {:?}", path);
        Ok(vec![path])
    }
}

/// Append one entry holding exactly `header.size()` bytes of `source`.
///
/// Bytes past that length are dropped and a short source is zero-padded,
/// so the entry always agrees with its header. Returns the padding length.
fn append_sized<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    mut header: tar::Header,
    source: impl Read,
) -> io::Result<u64> {
    let mut data = FixedLength::new(source, header.size()?);
    builder.append_data(&mut header, name, &mut data)?;
    Ok(data.padded)
}

/// Reader yielding exactly `remaining` bytes: the source's, then zeros
struct FixedLength<R> {
    source: R,
    remaining: u64,
    padded: u64,
}

impl<R: Read> FixedLength<R> {
    fn new(source: R, len: u64) -> Self {
        Self {
            source,
            remaining: len,
            padded: 0,
        }
    }
}

impl<R: Read> Read for FixedLength<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }

        let n = match self.source.read(&mut buf[..want])? {
            0 => {
                buf[..want].fill(0);
                self.padded += want as u64;
                want
            }
            n => n,
        };
        self.remaining -= n as u64;
        Ok(n)
    }
}
