use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::{PackError, PackResult};

/// An output being written under a unique scratch name beside its destination.
///
/// Dropping an unplaced artifact removes the scratch file.
#[derive(Debug)]
pub struct Artifact {
    temp: TempPath,
}

impl Artifact {
    /// Create a scratch file in the parent directory of `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch file cannot be created.
    pub fn create_beside(destination: &Path) -> PackResult<(File, Self)> {
        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stem = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (file, temp) = tempfile::Builder::new()
            .prefix(&format!(".{stem}."))
            .suffix(".partial")
            .tempfile_in(parent)
            .map_err(|source| PackError::io("artifact.create", parent, source))?
            .into_parts();
        Ok((file, Self { temp }))
    }

    /// Current scratch location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Remove the scratch file now instead of on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn discard(self) -> PackResult<()> {
        let path = self.temp.to_path_buf();
        self.temp
            .close()
            .map_err(|source| PackError::io("artifact.discard", path, source))
    }

    pub(crate) fn into_temp(self) -> TempPath {
        self.temp
    }
}

/// An artifact relocated to its final name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedArtifact {
    path: PathBuf,
}

impl PlacedArtifact {
    /// Refer to an output already at its final path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Final location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume into the final location.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    #[test]
    fn scratch_file_lives_beside_destination_and_is_removed_on_drop() -> Result<()> {
        let temp = tempfile::Builder::new().prefix("stowage-artifact-").tempdir()?;
        let destination = temp.path().join("run.tar");

        let (mut file, artifact) = Artifact::create_beside(&destination)?;
        file.write_all(b"partial")?;
        let scratch = artifact.path().to_path_buf();
        assert_eq!(scratch.parent(), Some(temp.path()));
        assert!(
            scratch
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(".run.tar."))
        );
        assert!(scratch.exists());

        drop(artifact);
        assert!(!scratch.exists());
        assert!(!destination.exists());
        Ok(())
    }

    #[test]
    fn discard_removes_scratch_file() -> Result<()> {
        let temp = tempfile::Builder::new().prefix("stowage-artifact-").tempdir()?;
        let (_file, artifact) = Artifact::create_beside(&temp.path().join("run.zip"))?;
        let scratch = artifact.path().to_path_buf();
        artifact.discard()?;
        assert!(!scratch.exists());
        Ok(())
    }
}
