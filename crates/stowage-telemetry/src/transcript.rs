//! Per-source log transcripts.
//!
//! # Design
//! - A transcript is an explicit logging context handed to each pipeline stage; there is
//!   no global handler to attach or detach.
//! - Every line is mirrored to the global `tracing` subscriber with a `source_set` field.
//! - Write failures are reported through `tracing` and never abort packaging.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use tracing::Level;

use crate::error::{TelemetryError, TelemetryResult};

/// Leveled, timestamped log sink scoped to one source set.
///
/// Cloning is cheap; clones share the same underlying file.
#[derive(Clone)]
pub struct Transcript {
    inner: Arc<Inner>,
}

struct Inner {
    label: String,
    path: Option<PathBuf>,
    sink: Option<Mutex<LineWriter<File>>>,
}

impl Transcript {
    /// Create (or truncate) the transcript file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(label: impl Into<String>, path: &Path) -> TelemetryResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| TelemetryError::TranscriptOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_file(label.into(), path, file))
    }

    /// Reopen an existing transcript for appending, creating it if it vanished.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn append(label: impl Into<String>, path: &Path) -> TelemetryResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| TelemetryError::TranscriptOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_file(label.into(), path, file))
    }

    /// Transcript that only forwards to `tracing`.
    #[must_use]
    pub fn sink(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                path: None,
                sink: None,
            }),
        }
    }

    fn with_file(label: String, path: &Path, file: File) -> Self {
        Self {
            inner: Arc::new(Inner {
                label,
                path: Some(path.to_path_buf()),
                sink: Some(Mutex::new(LineWriter::new(file))),
            }),
        }
    }

    /// Label identifying the source set in mirrored `tracing` events.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Record an informational line.
    pub fn info(&self, message: impl Display) {
        let message = message.to_string();
        tracing::info!(source_set = %self.label(), "{message}");
        self.write_line(Level::INFO, &message);
    }

    /// Record a warning line.
    pub fn warn(&self, message: impl Display) {
        let message = message.to_string();
        tracing::warn!(source_set = %self.label(), "{message}");
        self.write_line(Level::WARN, &message);
    }

    /// Record an error line. Used for conditions that end the run.
    pub fn error(&self, message: impl Display) {
        let message = message.to_string();
        tracing::error!(source_set = %self.label(), "{message}");
        self.write_line(Level::ERROR, &message);
    }

    fn write_line(&self, level: Level, message: &str) {
        let Some(sink) = &self.inner.sink else {
            return;
        };
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let level = level.to_string();
        let Ok(mut writer) = sink.lock() else {
            tracing::warn!(source_set = %self.label(), "transcript lock poisoned; line dropped");
            return;
        };
        if let Err(error) = writeln!(writer, "{timestamp} {level:<5} {message}") {
            tracing::warn!(
                source_set = %self.label(),
                error = %error,
                "failed to write transcript line"
            );
        }
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Transcript")
            .field("label", &self.inner.label)
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}
