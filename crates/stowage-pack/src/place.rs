//! Destination checks and atomic placement.
//!
//! # Design
//! - Every output path is checked before any destructive work; a collision without
//!   overwrite stops the whole run.
//! - Placement is a single rename of a scratch file that already lives in the
//!   destination directory, so readers see either nothing or the complete output.
//! - A failed placement removes the scratch file and carries a failure category
//!   that maps to its own exit status.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use stowage_config::SourceSet;
use stowage_telemetry::Transcript;
use tempfile::{PathPersistError, TempPath};

use crate::error::{PackError, PackResult, PlacementFailure};
use crate::model::{Artifact, PlacedArtifact};

/// Verify that writing `paths` is allowed.
///
/// Existing paths are tolerated with a warning when `overwrite` is set.
///
/// # Errors
///
/// Returns [`PackError::DestinationExists`] for the first existing path when
/// overwriting is disabled, or an IO error if a path cannot be inspected.
pub fn check_destination(paths: &[PathBuf], overwrite: bool, log: &Transcript) -> PackResult<()> {
    for path in paths {
        match fs::symlink_metadata(path) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PackError::io("place.check_destination", path, source)),
            Ok(_) if overwrite => {
                log.warn(format!("{} exists and will be overwritten", path.display()));
            }
            Ok(_) => {
                log.error(format!(
                    "destination {} already exists and overwrite is disabled",
                    path.display()
                ));
                return Err(PackError::DestinationExists { path: path.clone() });
            }
        }
    }
    Ok(())
}

/// Check the destinations of every source set before any of them is processed.
///
/// # Errors
///
/// Returns the first failure from [`check_destination`].
pub fn preflight(sets: &[SourceSet], overwrite: bool) -> PackResult<()> {
    let log = Transcript::sink("preflight");
    for set in sets {
        check_destination(&set.destination_paths(), overwrite, &log)?;
    }
    log.info(format!("destinations clear for {} source set(s)", sets.len()));
    Ok(())
}

/// Atomically move `artifact` to `final_path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`PackError::Placement`] with the failure category; the scratch file is
/// removed before returning.
pub fn place(
    artifact: Artifact,
    final_path: &Path,
    log: &Transcript,
) -> PackResult<PlacedArtifact> {
    let temp = artifact.into_temp();
    if fs::symlink_metadata(final_path).is_ok_and(|meta| meta.is_dir()) {
        let source = io::Error::from(io::ErrorKind::IsADirectory);
        return Err(placement_failed(temp, final_path, source, log));
    }
    match temp.persist(final_path) {
        Ok(()) => {
            log.info(format!("placed {}", final_path.display()));
            Ok(PlacedArtifact::new(final_path))
        }
        Err(PathPersistError { error, path }) => {
            Err(placement_failed(path, final_path, error, log))
        }
    }
}

fn placement_failed(
    temp: TempPath,
    final_path: &Path,
    source: io::Error,
    log: &Transcript,
) -> PackError {
    let failure = PlacementFailure::classify(&source);
    let scratch = temp.to_path_buf();
    if let Err(cleanup) = temp.close() {
        log.warn(format!(
            "failed to remove scratch file {}: {cleanup}",
            scratch.display()
        ));
    }
    log.error(format!(
        "cannot place {} at {} ({failure}): {source}",
        scratch.display(),
        final_path.display()
    ));
    PackError::Placement {
        failure,
        path: final_path.to_path_buf(),
        source,
    }
}

/// Delete a placed intermediate that the next stage has consumed.
///
/// # Errors
///
/// Returns an error if the file cannot be removed.
pub fn discard(path: &Path, log: &Transcript) -> PackResult<()> {
    fs::remove_file(path).map_err(|source| PackError::io("place.discard", path, source))?;
    log.info(format!("removed intermediate {}", path.display()));
    Ok(())
}
