//! Process exit statuses.

use std::fmt::{self, Display, Formatter};

/// Terminal status of a packaging run; each fatal category owns one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every source set was packaged.
    Success,
    /// Unclassified IO failure.
    Failure,
    /// The run configuration was rejected before any work started.
    InvalidConfig,
    /// An output path already existed and overwriting was disabled.
    DestinationExists,
    /// Interrupted while the container was being written.
    InterruptedArchive,
    /// Interrupted while a container was being compressed.
    InterruptedCompression,
    /// A directory sits where an output file belongs, or vice versa.
    TypeConflict,
    /// Placement was refused by the operating system.
    PermissionDenied,
    /// Placement failed for another operating-system reason.
    PlacementFailed,
    /// Interrupted while enumerating, sizing or hashing.
    InterruptedScan,
}

impl ExitStatus {
    /// Numeric process exit code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::InvalidConfig => 2,
            Self::DestinationExists => 3,
            Self::InterruptedArchive => 4,
            Self::InterruptedCompression => 5,
            Self::TypeConflict => 6,
            Self::PermissionDenied => 7,
            Self::PlacementFailed => 8,
            Self::InterruptedScan => 9,
        }
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::InvalidConfig => "invalid_config",
            Self::DestinationExists => "destination_exists",
            Self::InterruptedArchive => "interrupted_archive",
            Self::InterruptedCompression => "interrupted_compression",
            Self::TypeConflict => "destination_type_conflict",
            Self::PermissionDenied => "permission_denied",
            Self::PlacementFailed => "placement_failed",
            Self::InterruptedScan => "interrupted_scan",
        }
    }
}

impl Display for ExitStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({})", self.as_str(), self.code())
    }
}
