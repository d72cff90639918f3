#![forbid(unsafe_code)]

//! Installs the maps of a playlist: download the zip into a staging
//! directory, unpack it into the maps folder, drop the zip.
//!
//! Every step is skipped when its result already exists on disk, so running
//! the pipeline twice over the same playlist does no work the second time.
//! A failing entry is reported and the batch moves on.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use zip::ZipArchive;

use crate::catalog::Catalog;
use crate::error::{BsmhError, Result};
use crate::identity::{resolve_identity, strip_reserved};
use crate::playlist::{PlaylistDocument, PlaylistEntry};

pub const ARCHIVE_EXTENSION: &str = "zip";

/// A playlist entry that could not be handled, with the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub content_hash: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed { downloaded: bool },
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub installed: Vec<String>,
    pub already_installed: Vec<String>,
    pub downloads: usize,
    pub unpacks: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl PipelineReport {
    pub fn summary(&self) -> String {
        format!(
            "{} installed, {} already present, {} skipped",
            self.installed.len(),
            self.already_installed.len(),
            self.skipped.len()
        )
    }
}

pub struct ArchivePipeline<'a, C: Catalog> {
    catalog: &'a C,
    output_dir: PathBuf,
    staging_dir: PathBuf,
}

impl<'a, C: Catalog> ArchivePipeline<'a, C> {
    pub fn new(
        catalog: &'a C,
        output_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            output_dir: output_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Processes the entries in document order.
    pub fn run(&self, document: &PlaylistDocument) -> Result<PipelineReport> {
        fs::create_dir_all(&self.output_dir).map_err(|err| BsmhError::io(&self.output_dir, err))?;
        fs::create_dir_all(&self.staging_dir)
            .map_err(|err| BsmhError::io(&self.staging_dir, err))?;

        let mut report = PipelineReport::default();
        let total = document.entries.len();
        for (index, entry) in document.entries.iter().enumerate() {
            let current = index + 1;
            match self.install(entry, current, total) {
                Ok((folder, InstallOutcome::AlreadyInstalled)) => {
                    report.already_installed.push(folder);
                }
                Ok((folder, InstallOutcome::Installed { downloaded })) => {
                    if downloaded {
                        report.downloads += 1;
                    }
                    report.unpacks += 1;
                    report.installed.push(folder);
                }
                Err(err) if err.is_recoverable() => {
                    eprintln!(
                        "[{current}/{total}] Warning: skipping {}: {err}",
                        entry.content_hash
                    );
                    warn!("skipped {}: {err}", entry.content_hash);
                    report.skipped.push(SkippedEntry {
                        content_hash: entry.content_hash.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    fn install(
        &self,
        entry: &PlaylistEntry,
        current: usize,
        total: usize,
    ) -> Result<(String, InstallOutcome)> {
        let identity = resolve_identity(self.catalog, entry)?;
        let folder = identity.folder_name();
        let target = self.output_dir.join(&folder);
        let staging = self.staging_path(&entry.content_hash);

        if target.exists() {
            println!("[{current}/{total}] {folder} is already installed");
            if staging.exists()
                && let Err(err) = fs::remove_file(&staging)
            {
                eprintln!(
                    "  Warning: could not remove leftover {}: {err}",
                    staging.display()
                );
            }
            return Ok((folder, InstallOutcome::AlreadyInstalled));
        }

        println!("[{current}/{total}] Installing {folder}");
        let downloaded = if staging.exists() {
            debug!("reusing staged archive {}", staging.display());
            false
        } else {
            let bytes = self.download(&entry.content_hash, &staging)?;
            println!("  Downloaded {bytes} bytes");
            true
        };

        if let Err(err) = unpack(&staging, &target) {
            // Neither a half-written folder nor a corrupt archive may be
            // mistaken for finished work on the next run.
            let _ = fs::remove_dir_all(&target);
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::remove_file(&staging).map_err(|err| BsmhError::io(&staging, err))?;

        Ok((folder, InstallOutcome::Installed { downloaded }))
    }

    fn staging_path(&self, hash: &str) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{ARCHIVE_EXTENSION}", strip_reserved(hash)))
    }

    /// Streams into `<archive>.part` and renames once complete, so a staged
    /// archive on disk is always a whole one.
    fn download(&self, hash: &str, staging: &Path) -> Result<u64> {
        let partial = staging.with_extension(format!("{ARCHIVE_EXTENSION}.part"));
        let file = File::create(&partial).map_err(|err| BsmhError::io(&partial, err))?;
        let result = stream_archive(self.catalog, hash, BufWriter::new(file), &partial);

        match result {
            Ok(bytes) => {
                fs::rename(&partial, staging).map_err(|err| BsmhError::io(staging, err))?;
                Ok(bytes)
            }
            Err(err) => {
                let _ = fs::remove_file(&partial);
                Err(err)
            }
        }
    }
}

/// Streams the archive for `hash` into `sink`. A failure on the local side,
/// such as a full disk, is reported against `partial` as an I/O error rather
/// than blamed on the catalog.
fn stream_archive(
    catalog: &impl Catalog,
    hash: &str,
    sink: impl Write,
    partial: &Path,
) -> Result<u64> {
    let mut sink = RecordingSink {
        inner: sink,
        failure: None,
    };
    let outcome = catalog
        .download_archive(hash, &mut sink)
        .and_then(|bytes| {
            sink.flush()
                .map(|_| bytes)
                .map_err(|err| BsmhError::io(partial, err))
        });
    match (outcome, sink.failure.take()) {
        (Err(_), Some(local)) => Err(BsmhError::io(partial, local)),
        (outcome, _) => outcome,
    }
}

/// Remembers the first error raised by the wrapped writer.
struct RecordingSink<W> {
    inner: W,
    failure: Option<io::Error>,
}

impl<W> RecordingSink<W> {
    fn record(&mut self, err: io::Error) -> io::Error {
        if self.failure.is_none() {
            self.failure = Some(io::Error::new(err.kind(), err.to_string()));
        }
        err
    }
}

impl<W: Write> Write for RecordingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(|err| self.record(err))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|err| self.record(err))
    }
}

fn unpack(archive: &Path, target: &Path) -> Result<()> {
    debug!("unpacking {} into {}", archive.display(), target.display());
    let file = File::open(archive).map_err(|err| BsmhError::io(archive, err))?;
    let unpack_error = |source: zip::result::ZipError| BsmhError::Unpack {
        archive: archive.to_path_buf(),
        source,
    };
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(unpack_error)?;
    fs::create_dir_all(target).map_err(|err| BsmhError::io(target, err))?;
    zip.extract(target).map_err(unpack_error)
}
