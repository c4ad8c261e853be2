use config::shared::ArchiveConfig;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info, warn};
use zstd::stream::write::Encoder;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::{bail, etl_error};

const WRITE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Compression settings of an [`ArchiveWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveWriterOptions {
    pub compression_level: i32,
    /// Number of zstd worker threads, `0` compresses on the calling thread.
    pub workers: u32,
}

impl ArchiveWriterOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        let workers = config.workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .map(|workers| u32::try_from(workers).unwrap_or(u32::MAX))
                .unwrap_or(1)
        });

        Self {
            compression_level: config.compression_level,
            workers,
        }
    }
}

impl Default for ArchiveWriterOptions {
    fn default() -> Self {
        Self {
            compression_level: ArchiveConfig::DEFAULT_COMPRESSION_LEVEL,
            workers: 0,
        }
    }
}

/// Totals of a closed archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub lines: u64,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
}

/// Streams documents into a single zstd frame, one JSON document per line.
///
/// Writes are blocking. Dropping a writer that was not closed still finishes the frame, so the
/// file decompresses to every line written so far.
///
/// A failed write may leave part of its line inside the compressor. From then on the writer is
/// poisoned: further writes and [`ArchiveWriter::close`] fail, and the frame is never finished,
/// so the archive cannot end in a truncated line.
pub struct ArchiveWriter {
    path: PathBuf,
    encoder: Option<Encoder<'static, BufWriter<File>>>,
    line: Vec<u8>,
    lines: u64,
    uncompressed_bytes: u64,
    poisoned: bool,
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("path", &self.path)
            .field("lines", &self.lines)
            .field("uncompressed_bytes", &self.uncompressed_bytes)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl ArchiveWriter {
    /// Creates the file at `path`, truncating any existing content.
    pub fn open(path: impl AsRef<Path>, options: ArchiveWriterOptions) -> EtlResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::create(&path)
            .map_err(|err| io_error(&path, "Archive file could not be created", err))?;
        let mut encoder = Encoder::new(
            BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, file),
            options.compression_level,
        )
        .map_err(|err| io_error(&path, "Archive compressor could not be initialized", err))?;

        encoder
            .include_checksum(true)
            .map_err(|err| io_error(&path, "Archive compressor could not be initialized", err))?;
        if options.workers > 0 {
            encoder.multithread(options.workers).map_err(|err| {
                io_error(&path, "Archive compressor could not be initialized", err)
            })?;
        }

        info!(
            path = %path.display(),
            compression_level = options.compression_level,
            workers = options.workers,
            "opened archive file"
        );

        Ok(Self {
            path,
            encoder: Some(encoder),
            line: Vec::new(),
            lines: 0,
            uncompressed_bytes: 0,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Returns whether an earlier write failed part way through its line.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Appends `document` as compact JSON followed by a newline.
    ///
    /// The whole line is serialized before anything reaches the compressor, so a document that
    /// fails to serialize leaves no partial line behind.
    pub fn write<T: Serialize>(&mut self, document: &T) -> EtlResult<()> {
        if self.poisoned {
            bail!(
                ErrorKind::InvalidState,
                "Archive writer failed earlier and accepts no more lines",
                format!("{}: {} complete lines", self.path.display(), self.lines)
            );
        }
        let Some(encoder) = self.encoder.as_mut() else {
            bail!(ErrorKind::InvalidState, "Archive writer is already closed");
        };

        self.line.clear();
        serde_json::to_writer(&mut self.line, document)?;
        self.line.push(b'\n');

        if let Err(err) = encoder.write_all(&self.line) {
            self.poisoned = true;
            return Err(io_error(&self.path, "Archive write failed", err));
        }

        self.lines += 1;
        self.uncompressed_bytes += self.line.len() as u64;

        Ok(())
    }

    /// Finishes the compressed frame and syncs the file to disk.
    pub fn close(mut self) -> EtlResult<ArchiveSummary> {
        let Some(encoder) = self.encoder.take() else {
            bail!(ErrorKind::InvalidState, "Archive writer is already closed");
        };

        if self.poisoned {
            // Dropping the encoder without finishing leaves the frame incomplete.
            drop(encoder);
            bail!(
                ErrorKind::DestinationIoError,
                "Archive was left unfinished after a failed write",
                format!(
                    "{}: the frame ends after {} complete lines and a partial one",
                    self.path.display(),
                    self.lines
                )
            );
        }

        let writer = encoder
            .finish()
            .map_err(|err| io_error(&self.path, "Archive frame could not be finished", err))?;
        let file = writer.into_inner().map_err(|err| {
            io_error(&self.path, "Archive buffer could not be flushed", err.into_error())
        })?;
        file.sync_all()
            .map_err(|err| io_error(&self.path, "Archive file could not be synced", err))?;
        let compressed_bytes = file
            .metadata()
            .map_err(|err| io_error(&self.path, "Archive file could not be inspected", err))?
            .len();

        Ok(ArchiveSummary {
            lines: self.lines,
            uncompressed_bytes: self.uncompressed_bytes,
            compressed_bytes,
        })
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        let Some(encoder) = self.encoder.take() else {
            return;
        };

        if self.poisoned {
            drop(encoder);
            error!(
                path = %self.path.display(),
                lines = self.lines,
                "archive writer dropped after a failed write, left the compressed frame unfinished"
            );
            return;
        }

        match encoder.finish().and_then(|mut writer| writer.flush()) {
            Ok(()) => warn!(
                path = %self.path.display(),
                lines = self.lines,
                "archive writer dropped before close, finished the compressed frame"
            ),
            Err(err) => error!(
                path = %self.path.display(),
                lines = self.lines,
                error = %err,
                "archive writer dropped before close and the compressed frame could not be finished"
            ),
        }
    }
}

fn io_error(path: &Path, description: &'static str, err: io::Error) -> EtlError {
    etl_error!(
        ErrorKind::DestinationIoError,
        description,
        format!("{}: {err}", path.display()),
        source: err
    )
}
