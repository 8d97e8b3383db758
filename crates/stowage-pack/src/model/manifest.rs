//! Checksum manifests.
//!
//! One `checksum<TAB>path<LF>` line per entry, sorted by checksum then path.
//! Names containing a tab or line feed cannot be represented; such entries are
//! still archived, but the rendered manifest will not parse back.

use std::fs;
use std::path::Path;

use crate::error::{PackError, PackResult};
use crate::model::FileEntry;

/// Placeholder checksum for entries whose content is unreachable.
pub const SENTINEL_CHECKSUM: &str = "00000000000000000000000000000000";

/// One `(checksum, path)` manifest line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManifestEntry {
    checksum: String,
    path: String,
}

impl ManifestEntry {
    /// Pair a checksum with the entry's portable name.
    #[must_use]
    pub fn new(checksum: impl Into<String>, entry: &FileEntry) -> Self {
        Self {
            checksum: checksum.into(),
            path: entry.archive_name(),
        }
    }

    /// Lowercase hex checksum.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// `/`-separated path relative to the working root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the checksum is the unreachable-content placeholder.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.checksum == SENTINEL_CHECKSUM
    }
}

/// Checksums for a file set, sorted by checksum and then by path.
///
/// The ordering makes the rendered manifest a pure function of file contents and
/// names, independent of enumeration order and worker scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from unordered entries.
    #[must_use]
    pub fn from_entries(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_unstable();
        Self { entries }
    }

    /// Entries in manifest order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest lists no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `checksum<TAB>path` lines, each terminated by `\n`.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}\t{}\n", entry.checksum, entry.path))
            .collect()
    }

    /// Write the rendered manifest to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self, path: &Path) -> PackResult<()> {
        fs::write(path, self.render())
            .map_err(|source| PackError::io("manifest.persist", path, source))
    }

    /// Parse rendered manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::MalformedManifest`] for lines without a tab-separated
    /// 32-character hex checksum.
    pub fn parse(text: &str) -> PackResult<Self> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let malformed = || PackError::MalformedManifest { line: index + 1 };
            let (checksum, path) = line.split_once('\t').ok_or_else(malformed)?;
            let well_formed = checksum.len() == SENTINEL_CHECKSUM.len()
                && checksum.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'));
            if !well_formed || path.is_empty() {
                return Err(malformed());
            }
            entries.push(ManifestEntry {
                checksum: checksum.to_string(),
                path: path.to_string(),
            });
        }
        Ok(Self::from_entries(entries))
    }

    /// Recompute every checksum under `root` and return the paths that differ.
    ///
    /// Unreachable content compares equal to the sentinel checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if a listed regular file cannot be read.
    pub fn verify_dir(&self, root: &Path) -> PackResult<Vec<String>> {
        let mut mismatched = Vec::new();
        for entry in &self.entries {
            let actual = FileEntry::new(&entry.path)
                .checksum(root)?
                .unwrap_or_else(|| SENTINEL_CHECKSUM.to_string());
            if actual != entry.checksum {
                mismatched.push(entry.path.clone());
            }
        }
        Ok(mismatched)
    }
}
