//! Content checksums and manifest construction.

use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use stowage_telemetry::Transcript;

use crate::error::{PackResult, Stage};
use crate::model::{FileEntry, Manifest, ManifestEntry, SENTINEL_CHECKSUM};
use crate::pool::WorkerPool;

const READ_BUFFER: usize = 1 << 20;

/// Lowercase hex MD5 of everything `reader` yields.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn digest_reader<R: Read>(reader: R) -> io::Result<String> {
    let mut context = md5::Context::new();
    io::copy(&mut BufReader::with_capacity(READ_BUFFER, reader), &mut context)?;
    Ok(format!("{:x}", context.finalize()))
}

/// Checksum every entry on `pool` and return the sorted manifest.
///
/// Unreadable symbolic links are logged and receive [`SENTINEL_CHECKSUM`].
///
/// # Errors
///
/// Returns an error if a regular file cannot be read, or if the pool is interrupted.
pub async fn compute_manifest(
    entries: &[FileEntry],
    working_root: &Path,
    pool: &WorkerPool,
    log: &Transcript,
) -> PackResult<Manifest> {
    let root = Arc::new(working_root.to_path_buf());
    let log = log.clone();
    let hashed = pool
        .map(entries.to_vec(), Stage::Scan, move |entry| {
            let checksum = entry.checksum(&root)?.unwrap_or_else(|| {
                log.warn(format!(
                    "unreadable symbolic link {entry}; recorded with sentinel checksum"
                ));
                SENTINEL_CHECKSUM.to_string()
            });
            Ok(ManifestEntry::new(checksum, &entry))
        })
        .await?;
    Ok(Manifest::from_entries(hashed))
}
