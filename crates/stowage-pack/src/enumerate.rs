//! Source tree enumeration.

use std::path::Path;

use stowage_telemetry::Transcript;
use walkdir::WalkDir;

use crate::error::{PackError, PackResult};
use crate::model::FileEntry;

/// List every regular file and symbolic link under `source_dir`.
///
/// Paths are relative to `working_root`. Links are listed but never followed,
/// directories are traversed but not listed, and special files are skipped with a
/// warning. No ordering is guaranteed.
///
/// # Errors
///
/// Returns an error if any part of the tree cannot be traversed.
pub fn enumerate(
    working_root: &Path,
    source_dir: &Path,
    log: &Transcript,
) -> PackResult<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for item in WalkDir::new(source_dir).follow_links(false) {
        let item = item.map_err(|source| PackError::walkdir("enumerate.walk", source_dir, source))?;
        let file_type = item.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() && !file_type.is_symlink() {
            log.warn(format!("skipping special file {}", item.path().display()));
            continue;
        }
        let relative = item.path().strip_prefix(working_root).map_err(|_| {
            PackError::io(
                "enumerate.relativize",
                item.path(),
                std::io::Error::other("entry lies outside the working root"),
            )
        })?;
        let entry = FileEntry::new(relative);
        if entry.archive_name().contains(['\t', '\n']) {
            log.warn(format!(
                "{} contains a tab or newline; its manifest line will not parse",
                item.path().display()
            ));
        }
        entries.push(entry);
    }
    Ok(entries)
}
