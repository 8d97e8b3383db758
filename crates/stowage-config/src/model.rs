//! Typed configuration models.
//!
//! # Design
//! - `RunConfig` is the validated input surface; `SourceSet` is what the pipeline consumes.
//! - Output paths are derived on demand from a single destination base so they can never drift.

use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Suffix appended to the destination base for the checksum manifest.
pub const MANIFEST_SUFFIX: &str = "md5.txt";
/// Suffix appended to the destination base for the per-source transcript.
pub const LOG_SUFFIX: &str = "log.txt";

/// Container format written by the archive stage, before any compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// POSIX tar stream, never compressed at write time.
    Tar,
    /// Zip archive with a light per-entry compression filter.
    Zip,
}

impl ContainerKind {
    /// File suffix used for an uncompressed container of this kind.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }
}

/// Stream compressor applied to a finished tar container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionKind {
    /// gzip / DEFLATE.
    Gzip,
    /// bzip2.
    Bzip2,
    /// xz / LZMA2.
    Xz,
}

impl CompressionKind {
    /// File suffix appended after the container suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
        }
    }
}

impl Display for CompressionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.suffix())
    }
}

/// User-facing archive extension; determines both container kind and compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveExtension {
    /// `tar`
    #[serde(rename = "tar")]
    Tar,
    /// `tar.gz`
    #[serde(rename = "tar.gz")]
    TarGz,
    /// `tar.bz2`
    #[serde(rename = "tar.bz2")]
    TarBz2,
    /// `tar.xz`
    #[serde(rename = "tar.xz")]
    TarXz,
    /// `zip`
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveExtension {
    /// Every supported extension, in the order they are presented to users.
    pub const ALL: [Self; 5] = [Self::TarBz2, Self::TarGz, Self::TarXz, Self::Tar, Self::Zip];

    /// Literal suffix, without a leading dot.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::Zip => "zip",
        }
    }

    /// Container written by the archive stage for this extension.
    #[must_use]
    pub const fn container(self) -> ContainerKind {
        match self {
            Self::Zip => ContainerKind::Zip,
            Self::Tar | Self::TarGz | Self::TarBz2 | Self::TarXz => ContainerKind::Tar,
        }
    }

    /// Compressor applied after the container is placed, if any.
    #[must_use]
    pub const fn compression(self) -> Option<CompressionKind> {
        match self {
            Self::TarGz => Some(CompressionKind::Gzip),
            Self::TarBz2 => Some(CompressionKind::Bzip2),
            Self::TarXz => Some(CompressionKind::Xz),
            Self::Tar | Self::Zip => None,
        }
    }
}

impl Display for ArchiveExtension {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ArchiveExtension {
    type Err = ConfigError;

    fn from_str(value: &str) -> ConfigResult<Self> {
        let normalised = value.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalised)
            .ok_or_else(|| {
                ConfigError::invalid("extension", "unsupported_extension", Some(value.to_string()))
            })
    }
}

/// Where packaged outputs are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSpec {
    /// One directory receives the outputs of every source.
    Shared(PathBuf),
    /// One directory per source, positionally matched.
    PerSource(Vec<PathBuf>),
}

impl DestinationSpec {
    /// Build the destination layout from the directories supplied on the command line.
    ///
    /// A single directory is shared by all sources; otherwise directories are matched
    /// one-to-one with sources.
    #[must_use]
    pub fn from_dirs(mut dirs: Vec<PathBuf>) -> Self {
        if dirs.len() == 1 {
            Self::Shared(dirs.remove(0))
        } else {
            Self::PerSource(dirs)
        }
    }

    pub(crate) fn dir_for(&self, index: usize) -> Option<&Path> {
        match self {
            Self::Shared(dir) => Some(dir.as_path()),
            Self::PerSource(dirs) => dirs.get(index).map(PathBuf::as_path),
        }
    }
}

/// Complete input for one packaging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Absolute source directories, processed in the given order.
    pub sources: Vec<PathBuf>,
    /// Destination directories for the outputs.
    pub destinations: DestinationSpec,
    /// Requested archive extension.
    pub extension: ArchiveExtension,
    /// Queue compression until every source has a placed container.
    pub defer_compression: bool,
    /// Remove each source directory once its container is placed.
    pub delete_source: bool,
    /// Replace pre-existing outputs instead of aborting the run.
    pub overwrite: bool,
    /// Size of the hashing pool.
    pub cpu_workers: usize,
    /// Size of the metadata and deferred-compression pools.
    pub io_workers: usize,
}

impl RunConfig {
    /// Render the configuration as pretty JSON for transcripts.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

/// One source directory with every output path resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSet {
    source: PathBuf,
    working_root: PathBuf,
    name: String,
    base: PathBuf,
    extension: ArchiveExtension,
}

impl SourceSet {
    pub(crate) fn new(
        source: PathBuf,
        working_root: PathBuf,
        name: String,
        destination_dir: &Path,
        extension: ArchiveExtension,
    ) -> Self {
        let base = destination_dir.join(&name);
        Self {
            source,
            working_root,
            name,
            base,
            extension,
        }
    }

    /// Source directory being packaged.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Directory entry paths are made relative to (the parent of the source).
    #[must_use]
    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// Final component of the source directory; also the destination file stem.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination path without any suffix.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Requested archive extension.
    #[must_use]
    pub const fn extension(&self) -> ArchiveExtension {
        self.extension
    }

    /// Compressor to run after the container is placed, if any.
    #[must_use]
    pub const fn compression(&self) -> Option<CompressionKind> {
        self.extension.compression()
    }

    /// Final archive path (`<base>.<extension>`).
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        with_suffix(&self.base, self.extension.as_str())
    }

    /// Path the uncompressed container is placed at.
    ///
    /// Equal to [`Self::archive_path`] when no compression is requested.
    #[must_use]
    pub fn container_path(&self) -> PathBuf {
        with_suffix(&self.base, self.extension.container().suffix())
    }

    /// Manifest path (`<base>.md5.txt`).
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        with_suffix(&self.base, MANIFEST_SUFFIX)
    }

    /// Transcript path (`<base>.log.txt`).
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        with_suffix(&self.base, LOG_SUFFIX)
    }

    /// Every path this set will write, checked before any destructive work.
    #[must_use]
    pub fn destination_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.archive_path(), self.manifest_path(), self.log_path()];
        if self.compression().is_some() {
            paths.push(self.container_path());
        }
        paths
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(".");
    raw.push(suffix);
    PathBuf::from(raw)
}
