//! Data carried between pipeline stages.
//!
//! # Design
//! - Entries are independent and relative to the working root; nothing references
//!   another entry.
//! - Size and checksum are computed on demand from the filesystem, never cached, so
//!   an entry can be handed to any worker.

mod artifact;
mod manifest;

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use stowage_config::CompressionKind;

use crate::error::{PackError, PackResult};
use crate::hash::digest_reader;

pub use artifact::{Artifact, PlacedArtifact};
pub use manifest::{Manifest, ManifestEntry, SENTINEL_CHECKSUM};

/// One file (or symbolic link) scheduled for packaging.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileEntry {
    path: PathBuf,
}

impl FileEntry {
    /// Entry for `path`, relative to the working root.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path relative to the working root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the entry on disk.
    #[must_use]
    pub fn absolute(&self, working_root: &Path) -> PathBuf {
        working_root.join(&self.path)
    }

    /// Portable, `/`-separated name used in manifests and containers.
    #[must_use]
    pub fn archive_name(&self) -> String {
        self.path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Byte size of the entry, following symbolic links.
    ///
    /// Returns `None` when the entry is a symbolic link whose target is missing or
    /// is not a regular file.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata lookup fails for anything but a link.
    pub fn size(&self, working_root: &Path) -> PackResult<Option<u64>> {
        let absolute = self.absolute(working_root);
        match fs::metadata(&absolute) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) | Err(_) if is_symlink(&absolute) => Ok(None),
            Ok(meta) => Ok(Some(meta.len())),
            Err(source) => Err(PackError::io("size.metadata", absolute, source)),
        }
    }

    /// Lowercase hex MD5 of the entry contents, following symbolic links.
    ///
    /// Returns `None` when the entry is a symbolic link whose target cannot be read
    /// as a regular file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or read.
    pub fn checksum(&self, working_root: &Path) -> PackResult<Option<String>> {
        let absolute = self.absolute(working_root);
        let link = is_symlink(&absolute);
        if link && !fs::metadata(&absolute).is_ok_and(|meta| meta.is_file()) {
            return Ok(None);
        }
        let file = match File::open(&absolute) {
            Ok(file) => file,
            Err(_) if link => return Ok(None),
            Err(source) => return Err(PackError::io("hash.open", absolute, source)),
        };
        digest_reader(file)
            .map(Some)
            .map_err(|source| PackError::io("hash.read", absolute, source))
    }
}

impl std::fmt::Display for FileEntry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.archive_name())
    }
}

pub(crate) fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Compression queued until every source set has a placed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredJob {
    /// Placed, uncompressed container.
    pub intermediate: PathBuf,
    /// Final compressed path.
    pub destination: PathBuf,
    /// Compressor to apply.
    pub kind: CompressionKind,
    /// Source set name, used as the transcript label.
    pub label: String,
    /// Transcript the job appends to.
    pub transcript: PathBuf,
}
