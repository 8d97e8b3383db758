use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use rand::seq::SliceRandom;
use stowage_config::{ArchiveExtension, CompressionKind, DestinationSpec, RunConfig};
use stowage_pack::{
    ExitStatus, FileEntry, Interrupt, Manifest, PackError, Packager, SENTINEL_CHECKSUM,
    WorkerPool, decompress_to,
    enumerate::enumerate,
    hash::compute_manifest,
    size::total_size,
};
use stowage_telemetry::Transcript;
use tempfile::TempDir;

const FILES: [(&str, &[u8]); 3] = [
    ("alpha.txt", b"first file\n"),
    ("nested/bravo.bin", b"\x00\x01\x02 second file"),
    ("nested/deeper/charlie.txt", b"third file, a little longer than the others\n"),
];

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("stowage-it-").tempdir()?;
        fs::create_dir_all(temp.path().join("data"))?;
        fs::create_dir_all(temp.path().join("out"))?;
        Ok(Self { temp })
    }

    fn source(&self, name: &str) -> Result<PathBuf> {
        let root = self.temp.path().join("data").join(name);
        for (relative, body) in FILES {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, body)?;
        }
        Ok(root)
    }

    fn out(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    fn config(&self, sources: Vec<PathBuf>, extension: ArchiveExtension) -> RunConfig {
        RunConfig {
            sources,
            destinations: DestinationSpec::Shared(self.out()),
            extension,
            defer_compression: false,
            delete_source: false,
            overwrite: false,
            cpu_workers: 2,
            io_workers: 4,
        }
    }

    fn out_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(self.out())?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        Ok(names)
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

fn assert_unpacked_tree(root: &Path, name: &str) -> Result<Manifest> {
    for (relative, body) in FILES {
        assert_eq!(fs::read(root.join(name).join(relative))?, body, "{relative}");
    }
    let manifest = Manifest::parse(&fs::read_to_string(root.join(format!("{name}.md5.txt")))?)?;
    assert_eq!(manifest.len(), FILES.len());
    assert!(manifest.verify_dir(root)?.is_empty());
    Ok(manifest)
}

#[tokio::test]
async fn manifest_ignores_enumeration_order_and_pool_size() -> Result<()> {
    let workspace = Workspace::new()?;
    let source = workspace.source("run")?;
    for index in 0_u8..16 {
        fs::write(source.join(format!("extra-{index}.dat")), vec![index % 3; 64])?;
    }
    let root = workspace.temp.path().join("data");
    let log = Transcript::sink("run");
    let mut entries = enumerate(&root, &source, &log)?;

    let serial = WorkerPool::new("hash", 1, Interrupt::new());
    let baseline = compute_manifest(&entries, &root, &serial, &log).await?.render();
    for workers in [2, 5, 32] {
        entries.shuffle(&mut rand::rng());
        let pool = WorkerPool::new("hash", workers, Interrupt::new());
        let manifest = compute_manifest(&entries, &root, &pool, &log).await?;
        assert_eq!(manifest.render(), baseline);
        assert!(
            manifest
                .entries()
                .windows(2)
                .all(|pair| pair[0].checksum() <= pair[1].checksum())
        );
    }
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn broken_links_only_yield_sentinels_and_zero_bytes() -> Result<()> {
    let workspace = Workspace::new()?;
    let root = workspace.temp.path().join("data");
    let source = root.join("links");
    fs::create_dir_all(&source)?;
    for name in ["one", "two", "three"] {
        std::os::unix::fs::symlink(format!("/nonexistent/{name}"), source.join(name))?;
    }
    let log = Transcript::sink("links");
    let entries = enumerate(&root, &source, &log)?;
    assert_eq!(entries.len(), 3);

    let pool = WorkerPool::new("io", 4, Interrupt::new());
    assert_eq!(total_size(&entries, &root, &pool, &log).await?, 0);
    let manifest = compute_manifest(&entries, &root, &pool, &log).await?;
    assert_eq!(manifest.len(), 3);
    assert!(manifest.entries().iter().all(|entry| entry.checksum() == SENTINEL_CHECKSUM));
    Ok(())
}

#[tokio::test]
async fn tar_container_round_trips_three_files() -> Result<()> {
    let workspace = Workspace::new()?;
    let config = workspace.config(vec![workspace.source("run")?], ArchiveExtension::Tar);
    let report = Packager::new(&config, Interrupt::new())?
        .run(&config.source_sets()?)
        .await?;
    assert_eq!(report.sets[0].files, 3);
    assert_eq!(workspace.out_names()?, ["run.log.txt", "run.tar"]);

    let mut archive = tar::Archive::new(File::open(workspace.out().join("run.tar"))?);
    let mut names = Vec::new();
    for entry in archive.entries()? {
        names.push(entry?.path()?.to_string_lossy().into_owned());
    }
    assert_eq!(names.first().map(String::as_str), Some("run.md5.txt"));
    assert_eq!(names.len(), 4);

    let unpacked = workspace.temp.path().join("unpacked");
    tar::Archive::new(File::open(workspace.out().join("run.tar"))?).unpack(&unpacked)?;
    let manifest = assert_unpacked_tree(&unpacked, "run")?;
    for entry in manifest.entries() {
        let relative = entry
            .path()
            .strip_prefix("run/")
            .ok_or_else(|| anyhow!("unexpected manifest path {}", entry.path()))?;
        let (_, body) = FILES
            .iter()
            .find(|(name, _)| *name == relative)
            .ok_or_else(|| anyhow!("unknown file {relative}"))?;
        assert_eq!(entry.checksum(), md5_hex(body));
    }
    Ok(())
}

#[tokio::test]
async fn zip_container_round_trips_three_files() -> Result<()> {
    let workspace = Workspace::new()?;
    let config = workspace.config(vec![workspace.source("run")?], ArchiveExtension::Zip);
    Packager::new(&config, Interrupt::new())?
        .run(&config.source_sets()?)
        .await?;

    let mut archive = zip::ZipArchive::new(File::open(workspace.out().join("run.zip"))?)?;
    assert_eq!(archive.len(), 4);
    assert_eq!(archive.by_index(0)?.name(), "run.md5.txt");
    for (relative, body) in FILES {
        let mut bytes = Vec::new();
        archive.by_name(&format!("run/{relative}"))?.read_to_end(&mut bytes)?;
        assert_eq!(bytes, body);
    }
    let mut manifest = String::new();
    archive.by_name("run.md5.txt")?.read_to_string(&mut manifest)?;
    assert_eq!(Manifest::parse(&manifest)?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn compressed_extensions_restore_the_container() -> Result<()> {
    for extension in [ArchiveExtension::TarGz, ArchiveExtension::TarBz2, ArchiveExtension::TarXz] {
        let workspace = Workspace::new()?;
        let config = workspace.config(vec![workspace.source("run")?], extension);
        let report = Packager::new(&config, Interrupt::new())?
            .run(&config.source_sets()?)
            .await?;
        let archive = workspace.out().join(format!("run.{extension}"));
        assert_eq!(
            workspace.out_names()?,
            ["run.log.txt".to_string(), format!("run.{extension}")]
        );
        assert_eq!(report.sets[0].archive, archive);

        let kind: CompressionKind = extension
            .compression()
            .ok_or_else(|| anyhow!("{extension} is not compressed"))?;
        let restored = workspace.temp.path().join("restored.tar");
        decompress_to(&archive, &restored, kind)?;
        let unpacked = workspace.temp.path().join("unpacked");
        tar::Archive::new(File::open(&restored)?).unpack(&unpacked)?;
        assert_unpacked_tree(&unpacked, "run")?;
    }
    Ok(())
}

#[tokio::test]
async fn existing_archive_without_overwrite_writes_nothing() -> Result<()> {
    let workspace = Workspace::new()?;
    let config = workspace.config(vec![workspace.source("run")?], ArchiveExtension::TarGz);
    fs::write(workspace.out().join("run.tar.gz"), b"previous archive")?;

    let err = Packager::new(&config, Interrupt::new())?
        .run(&config.source_sets()?)
        .await
        .err()
        .ok_or_else(|| anyhow!("collision was not detected"))?;
    assert!(matches!(err, PackError::DestinationExists { .. }));
    assert_eq!(err.exit_status(), ExitStatus::DestinationExists);
    assert_eq!(err.exit_status().code(), 3);
    assert_eq!(workspace.out_names()?, ["run.tar.gz"]);
    assert_eq!(fs::read(workspace.out().join("run.tar.gz"))?, b"previous archive");
    Ok(())
}

#[tokio::test]
async fn deferred_compression_waits_for_every_container() -> Result<()> {
    let workspace = Workspace::new()?;
    let mut config = workspace.config(
        vec![workspace.source("first")?, workspace.source("second")?],
        ArchiveExtension::TarXz,
    );
    config.defer_compression = true;
    let sets = config.source_sets()?;
    let packager = Packager::new(&config, Interrupt::new())?;

    let mut jobs = Vec::new();
    for set in &sets {
        let report = packager.stage_set(set).await?;
        jobs.extend(report.deferred);
    }
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert!(job.intermediate.exists());
        assert!(!job.destination.exists());
    }

    let stats = packager.drain_deferred(jobs.clone()).await?;
    assert_eq!(stats.len(), 2);
    for job in &jobs {
        assert!(job.destination.exists());
        assert!(!job.intermediate.exists());
        let transcript = fs::read_to_string(&job.transcript)?;
        assert!(transcript.contains("deferred"));
        assert!(transcript.contains("compressing"));
    }
    assert_eq!(
        workspace.out_names()?,
        [
            "first.log.txt",
            "first.tar.xz",
            "second.log.txt",
            "second.tar.xz"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn deferred_run_reports_every_compression() -> Result<()> {
    let workspace = Workspace::new()?;
    let mut config = workspace.config(
        vec![workspace.source("first")?, workspace.source("second")?],
        ArchiveExtension::TarGz,
    );
    config.defer_compression = true;
    let report = Packager::new(&config, Interrupt::new())?
        .run(&config.source_sets()?)
        .await?;

    assert_eq!(report.deferred.len(), 2);
    assert!(report.sets.iter().all(|set| set.compression.is_none()));
    assert_eq!(report.compressions().count(), 2);
    assert!(!workspace.out().join("first.tar").exists());
    assert!(!workspace.out().join("second.tar").exists());
    Ok(())
}

#[tokio::test]
async fn directory_at_container_path_is_a_type_conflict() -> Result<()> {
    let workspace = Workspace::new()?;
    let mut config = workspace.config(vec![workspace.source("run")?], ArchiveExtension::Tar);
    config.overwrite = true;
    fs::create_dir(workspace.out().join("run.tar"))?;

    let err = Packager::new(&config, Interrupt::new())?
        .run(&config.source_sets()?)
        .await
        .err()
        .ok_or_else(|| anyhow!("placement over a directory succeeded"))?;
    assert_eq!(err.exit_status(), ExitStatus::TypeConflict);
    assert_eq!(err.exit_status().code(), 6);
    assert!(
        workspace
            .out_names()?
            .iter()
            .all(|name| !name.ends_with(".partial") && name != "run.md5.txt")
    );
    let transcript = fs::read_to_string(workspace.out().join("run.log.txt"))?;
    assert!(transcript.contains("ERROR"));
    assert!(transcript.contains("run.tar"));
    Ok(())
}

#[test]
fn entries_are_relative_to_the_working_root() -> Result<()> {
    let workspace = Workspace::new()?;
    let source = workspace.source("run")?;
    let root = workspace.temp.path().join("data");
    let mut names: Vec<String> = enumerate(&root, &source, &Transcript::sink("run"))?
        .iter()
        .map(FileEntry::archive_name)
        .collect();
    names.sort();
    assert_eq!(
        names,
        [
            "run/alpha.txt",
            "run/nested/bravo.bin",
            "run/nested/deeper/charlie.txt"
        ]
    );
    Ok(())
}
