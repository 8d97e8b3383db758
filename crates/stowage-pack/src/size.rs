//! Total byte size of a file set.

use std::path::Path;
use std::sync::Arc;

use stowage_telemetry::Transcript;

use crate::error::{PackResult, Stage};
use crate::model::FileEntry;
use crate::pool::WorkerPool;

/// Sum the sizes of `entries` using metadata lookups on `pool`.
///
/// Symbolic links are sized by their target; unreadable links count as zero bytes
/// and are logged as warnings.
///
/// # Errors
///
/// Returns an error for any other metadata failure, or if the pool is interrupted.
pub async fn total_size(
    entries: &[FileEntry],
    working_root: &Path,
    pool: &WorkerPool,
    log: &Transcript,
) -> PackResult<u64> {
    let root = Arc::new(working_root.to_path_buf());
    let log = log.clone();
    let sizes = pool
        .map(entries.to_vec(), Stage::Scan, move |entry| {
            Ok(entry.size(&root)?.unwrap_or_else(|| {
                log.warn(format!("unreadable symbolic link {entry}; counted as 0 bytes"));
                0
            }))
        })
        .await?;
    Ok(sizes.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::Interrupt;
    use anyhow::Result;
    use std::fs;

    #[tokio::test]
    async fn sum_matches_serial_total_for_any_pool_size() -> Result<()> {
        let temp = tempfile::Builder::new().prefix("stowage-size-").tempdir()?;
        fs::create_dir(temp.path().join("run"))?;
        let mut entries = Vec::new();
        let mut expected = 0_u64;
        for index in 0..12_u64 {
            let name = format!("run/file-{index}.bin");
            let len = index * 37;
            fs::write(temp.path().join(&name), vec![7_u8; usize::try_from(len)?])?;
            entries.push(FileEntry::new(name));
            expected += len;
        }

        for workers in [1, 3, 16] {
            let pool = WorkerPool::new("io", workers, Interrupt::new());
            let total = total_size(&entries, temp.path(), &pool, &Transcript::sink("run")).await?;
            assert_eq!(total, expected);
        }
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn links_are_sized_by_target_and_broken_links_are_zero() -> Result<()> {
        let temp = tempfile::Builder::new().prefix("stowage-size-").tempdir()?;
        fs::create_dir(temp.path().join("run"))?;
        fs::write(temp.path().join("run/data.bin"), vec![1_u8; 100])?;
        std::os::unix::fs::symlink("data.bin", temp.path().join("run/alias"))?;
        std::os::unix::fs::symlink("missing.bin", temp.path().join("run/dangling"))?;

        let entries = vec![
            FileEntry::new("run/data.bin"),
            FileEntry::new("run/alias"),
            FileEntry::new("run/dangling"),
        ];
        let pool = WorkerPool::new("io", 2, Interrupt::new());
        let total = total_size(&entries, temp.path(), &pool, &Transcript::sink("run")).await?;
        assert_eq!(total, 200);
        Ok(())
    }

    #[tokio::test]
    async fn vanished_regular_file_fails_the_run() -> Result<()> {
        let temp = tempfile::Builder::new().prefix("stowage-size-").tempdir()?;
        let pool = WorkerPool::new("io", 2, Interrupt::new());
        let result = total_size(
            &[FileEntry::new("run/vanished.bin")],
            temp.path(),
            &pool,
            &Transcript::sink("run"),
        )
        .await;
        assert!(matches!(result, Err(crate::error::PackError::Io { .. })));
        Ok(())
    }
}
