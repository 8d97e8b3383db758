//! Stream compression of placed containers.
//!
//! # Design
//! - Bytes stream from the placed container through the encoder into a scratch
//!   artifact beside the final path; the artifact is placed only after the encoder
//!   has finished and the file is synced.
//! - The uncompressed container is removed only once the compressed output is in
//!   place.
//! - A result larger than its input is reported, never rejected.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use bzip2::{read::BzDecoder, write::BzEncoder};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use stowage_config::CompressionKind;
use stowage_telemetry::Transcript;
use xz2::{read::XzDecoder, write::XzEncoder};

use crate::error::{PackError, PackResult, Stage};
use crate::interrupt::{Interrupt, Interruptible};
use crate::model::{Artifact, DeferredJob};
use crate::place::{discard, place};
use crate::pool::WorkerPool;

const STREAM_BUFFER: usize = 1 << 20;
const XZ_PRESET: u32 = 6;

/// Outcome of compressing one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionStats {
    /// Compressor applied.
    pub kind: CompressionKind,
    /// Bytes read from the uncompressed container.
    pub source_bytes: u64,
    /// Bytes in the placed compressed output.
    pub compressed_bytes: u64,
    /// Final compressed path.
    pub destination: PathBuf,
}

impl CompressionStats {
    /// Whether the output is smaller than the input.
    #[must_use]
    pub const fn shrank(&self) -> bool {
        self.compressed_bytes < self.source_bytes
    }

    /// Output size as a fraction of the input size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.source_bytes == 0 {
            return 1.0;
        }
        self.compressed_bytes as f64 / self.source_bytes as f64
    }
}

enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    fn new(kind: CompressionKind, writer: W) -> Self {
        match kind {
            CompressionKind::Gzip => Self::Gzip(GzEncoder::new(writer, Compression::default())),
            CompressionKind::Bzip2 => {
                Self::Bzip2(BzEncoder::new(writer, bzip2::Compression::default()))
            }
            CompressionKind::Xz => Self::Xz(XzEncoder::new(writer, XZ_PRESET)),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Self::Gzip(encoder) => encoder.finish(),
            Self::Bzip2(encoder) => encoder.finish(),
            Self::Xz(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(encoder) => encoder.write(buf),
            Self::Bzip2(encoder) => encoder.write(buf),
            Self::Xz(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.flush(),
            Self::Bzip2(encoder) => encoder.flush(),
            Self::Xz(encoder) => encoder.flush(),
        }
    }
}

fn decoder<'a>(kind: CompressionKind, reader: impl Read + 'a) -> Box<dyn Read + 'a> {
    match kind {
        CompressionKind::Gzip => Box::new(GzDecoder::new(reader)),
        CompressionKind::Bzip2 => Box::new(BzDecoder::new(reader)),
        CompressionKind::Xz => Box::new(XzDecoder::new(reader)),
    }
}

/// Compress `source` into `destination`, place it, and delete `source`.
///
/// # Errors
///
/// Returns [`PackError::Interrupted`] with [`Stage::Compress`] if the interrupt flag
/// is raised mid-stream, a placement error, or the underlying IO error. The partial
/// output is removed and `source` is kept on failure.
pub fn compress_artifact(
    source: &Path,
    destination: &Path,
    kind: CompressionKind,
    interrupt: &Interrupt,
    log: &Transcript,
) -> PackResult<CompressionStats> {
    log.info(format!("compressing {} with {kind}", source.display()));
    let (file, artifact) = Artifact::create_beside(destination)?;
    let streamed = interrupt
        .check(Stage::Compress)
        .and_then(|()| stream(source, file, destination, kind, interrupt));
    let (source_bytes, compressed_bytes) = match streamed {
        Ok(sizes) => sizes,
        Err(error) => {
            if let Err(cleanup) = artifact.discard() {
                log.warn(format!("failed to remove partial output: {}", cleanup.describe()));
            }
            return Err(error);
        }
    };

    let placed = place(artifact, destination, log)?;
    let stats = CompressionStats {
        kind,
        source_bytes,
        compressed_bytes,
        destination: placed.into_path(),
    };
    if stats.shrank() {
        log.info(format!(
            "compressed {} -> {} bytes ({:.1}%)",
            stats.source_bytes,
            stats.compressed_bytes,
            stats.ratio() * 100.0
        ));
    } else {
        log.warn(format!(
            "{kind} output is not smaller than its input ({} -> {} bytes)",
            stats.source_bytes, stats.compressed_bytes
        ));
    }
    discard(source, log)?;
    Ok(stats)
}

fn stream(
    source: &Path,
    file: File,
    destination: &Path,
    kind: CompressionKind,
    interrupt: &Interrupt,
) -> PackResult<(u64, u64)> {
    let input = File::open(source)
        .map_err(|error| PackError::io("compress.open_source", source, error))?;
    let mut reader = BufReader::with_capacity(STREAM_BUFFER, Interruptible::new(input, interrupt));
    let mut encoder = Encoder::new(kind, BufWriter::with_capacity(STREAM_BUFFER, file));
    let copied = io::copy(&mut reader, &mut encoder)
        .map_err(|error| interrupt.classify(Stage::Compress, "compress.stream", source, error))?;
    let buffered = encoder
        .finish()
        .map_err(|error| PackError::io("compress.finish", destination, error))?;
    let file = buffered
        .into_inner()
        .map_err(|error| PackError::io("compress.flush", destination, error.into_error()))?;
    file.sync_all()
        .map_err(|error| PackError::io("compress.sync", destination, error))?;
    let written = file
        .metadata()
        .map_err(|error| PackError::io("compress.stat", destination, error))?
        .len();
    Ok((copied, written))
}

/// Drain queued compression jobs on `pool`.
///
/// `log_for` opens the transcript each job reports to.
///
/// # Errors
///
/// Returns [`PackError::Interrupted`] with [`Stage::Compress`] if interrupted, or
/// the first job failure.
pub async fn run_deferred<L>(
    jobs: Vec<DeferredJob>,
    pool: &WorkerPool,
    log_for: L,
) -> PackResult<Vec<CompressionStats>>
where
    L: Fn(&DeferredJob) -> PackResult<Transcript> + Send + Sync + 'static,
{
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    let interrupt = pool.interrupt().clone();
    pool.map(jobs, Stage::Compress, move |job| {
        let log = log_for(&job)?;
        compress_artifact(&job.intermediate, &job.destination, job.kind, &interrupt, &log)
            .inspect_err(|error| {
                log.error(format!("deferred compression failed: {}", error.describe()));
            })
    })
    .await
}

/// Decompress `source` into a new file at `destination`.
///
/// Returns the number of decompressed bytes.
///
/// # Errors
///
/// Returns an error if either file cannot be opened or the stream is corrupt.
pub fn decompress_to(source: &Path, destination: &Path, kind: CompressionKind) -> PackResult<u64> {
    let input =
        File::open(source).map_err(|error| PackError::io("decompress.open", source, error))?;
    let mut reader = decoder(kind, BufReader::with_capacity(STREAM_BUFFER, input));
    let output = File::create(destination)
        .map_err(|error| PackError::io("decompress.create", destination, error))?;
    let mut writer = BufWriter::with_capacity(STREAM_BUFFER, output);
    let copied = io::copy(&mut reader, &mut writer)
        .map_err(|error| PackError::io("decompress.stream", source, error))?;
    writer
        .flush()
        .map_err(|error| PackError::io("decompress.flush", destination, error))?;
    Ok(copied)
}
