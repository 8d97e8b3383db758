//! CLI error type and exit-code mapping.

use std::error::Error as _;
use std::fmt::{self, Display, Formatter};

use stowage_config::ConfigError;
use stowage_pack::{ExitStatus, PackError};

/// Distinguishes rejected input from pipeline failures so each maps to its own
/// exit status.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Config(ConfigError),
    Pack(PackError),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Config(_) => ExitStatus::InvalidConfig.code(),
            Self::Pack(error) => error.exit_status().code(),
            Self::Failure(_) => ExitStatus::Failure.code(),
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Config(ConfigError::InvalidField {
                field,
                reason,
                value,
            }) => match value {
                Some(value) => format!("invalid {field} ({reason}): {value}"),
                None => format!("invalid {field} ({reason})"),
            },
            Self::Config(error) => match error.source() {
                Some(source) => format!("{error}: {source}"),
                None => error.to_string(),
            },
            Self::Pack(error) => format!("{} [{}]", error.describe(), error.exit_status()),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<PackError> for CliError {
    fn from(error: PackError) -> Self {
        Self::Pack(error)
    }
}
