//! # Design
//!
//! - Provide structured, constant-message errors for the packaging pipeline.
//! - Capture operation context (paths, stages, pools) so fatal log lines can name the
//!   offending path without re-parsing messages.
//! - Every error maps onto exactly one process [`ExitStatus`].

use std::error::Error as _;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::exit::ExitStatus;

/// Result type for packaging operations.
pub type PackResult<T> = Result<T, PackError>;

/// Pipeline stage an interrupt was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Enumeration, sizing or hashing.
    Scan,
    /// Writing the uncompressed container.
    Archive,
    /// Stream-compressing a placed container.
    Compress,
}

impl Stage {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Archive => "archive",
            Self::Compress => "compress",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Category of a failed relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementFailure {
    /// Destination exists as a directory where a file is expected, or vice versa.
    TypeConflict,
    /// The operating system refused the rename.
    PermissionDenied,
    /// Any other relocation failure.
    Os,
}

impl PlacementFailure {
    /// Classify an IO error raised by a rename.
    #[must_use]
    pub fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::DirectoryNotEmpty => Self::TypeConflict,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Os,
        }
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeConflict => "destination_type_conflict",
            Self::PermissionDenied => "permission_denied",
            Self::Os => "os_failure",
        }
    }
}

impl Display for PlacementFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors produced by the packaging pipeline.
#[derive(Debug, Error)]
pub enum PackError {
    /// IO failures while interacting with the filesystem.
    #[error("packaging io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory traversal failures.
    #[error("source traversal failure")]
    Walk {
        /// Operation that triggered the traversal failure.
        operation: &'static str,
        /// Root being traversed.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Zip container failures.
    #[error("zip container failure")]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Path involved in the archive failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// An output path already exists and overwriting is disabled.
    #[error("destination already exists")]
    DestinationExists {
        /// Pre-existing path.
        path: PathBuf,
    },
    /// Relocating a temporary artifact to its final path failed.
    #[error("artifact placement failed")]
    Placement {
        /// Failure category.
        failure: PlacementFailure,
        /// Final path that could not be written.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// An interrupt signal stopped the run.
    #[error("packaging interrupted")]
    Interrupted {
        /// Stage that observed the interrupt.
        stage: Stage,
    },
    /// A manifest file could not be parsed.
    #[error("malformed manifest line")]
    MalformedManifest {
        /// One-based line number.
        line: usize,
    },
    /// A worker pool was closed while work was being dispatched.
    #[error("worker pool unavailable")]
    PoolClosed {
        /// Pool name.
        pool: &'static str,
    },
    /// A pooled task panicked or was cancelled.
    #[error("worker task failed")]
    Join {
        /// Pool name.
        pool: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
    /// Opening a per-source transcript failed.
    #[error("transcript unavailable")]
    Transcript {
        /// Underlying telemetry error.
        source: stowage_telemetry::TelemetryError,
    },
    /// Serialising the run configuration failed.
    #[error("configuration unavailable")]
    Config {
        /// Underlying configuration error.
        source: stowage_config::ConfigError,
    },
}

impl PackError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walk {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Process exit status this error terminates the run with.
    #[must_use]
    pub const fn exit_status(&self) -> ExitStatus {
        match self {
            Self::DestinationExists { .. } => ExitStatus::DestinationExists,
            Self::Interrupted {
                stage: Stage::Archive,
            } => ExitStatus::InterruptedArchive,
            Self::Interrupted {
                stage: Stage::Compress,
            } => ExitStatus::InterruptedCompression,
            Self::Interrupted { stage: Stage::Scan } => ExitStatus::InterruptedScan,
            Self::Placement { failure, .. } => match failure {
                PlacementFailure::TypeConflict => ExitStatus::TypeConflict,
                PlacementFailure::PermissionDenied => ExitStatus::PermissionDenied,
                PlacementFailure::Os => ExitStatus::PlacementFailed,
            },
            Self::Config { .. } => ExitStatus::InvalidConfig,
            Self::Io { .. }
            | Self::Walk { .. }
            | Self::Zip { .. }
            | Self::MalformedManifest { .. }
            | Self::PoolClosed { .. }
            | Self::Join { .. }
            | Self::Transcript { .. } => ExitStatus::Failure,
        }
    }

    /// Path the failure is about, when one is known.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. }
            | Self::Walk { path, .. }
            | Self::Zip { path, .. }
            | Self::DestinationExists { path }
            | Self::Placement { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Human-readable rendering including the operation, path, and source chain.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut rendered = self.to_string();
        match self {
            Self::Io { operation, .. }
            | Self::Walk { operation, .. }
            | Self::Zip { operation, .. } => {
                rendered.push_str(&format!(" during {operation}"));
            }
            Self::Placement { failure, .. } => rendered.push_str(&format!(" ({failure})")),
            Self::Interrupted { stage } => rendered.push_str(&format!(" during {stage}")),
            Self::MalformedManifest { line } => rendered.push_str(&format!(" at line {line}")),
            Self::PoolClosed { pool } | Self::Join { pool, .. } => {
                rendered.push_str(&format!(" in {pool} pool"));
            }
            _ => {}
        }
        if let Some(path) = self.path() {
            rendered.push_str(&format!(" at {}", path.display()));
        }
        let mut cause = self.source();
        while let Some(error) = cause {
            rendered.push_str(&format!(": {error}"));
            cause = error.source();
        }
        rendered
    }
}
