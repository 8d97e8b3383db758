//! Container construction.
//!
//! # Design
//! - The manifest is written into the container first, under its file name, and
//!   removed from disk as soon as it is embedded.
//! - Construction is sequential on the calling thread; callers run it on a blocking
//!   task.
//! - Output goes to a scratch [`Artifact`]; any failure drops it, so the final path
//!   never observes a partial container.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Cursor, Write},
    path::Path,
};

use stowage_config::ContainerKind;
use stowage_telemetry::Transcript;
use tar::{Builder as TarBuilder, Header, HeaderMode};
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::error::{PackError, PackResult, Stage};
use crate::interrupt::{Interrupt, Interruptible};
use crate::model::{Artifact, FileEntry, is_symlink};

const WRITE_BUFFER: usize = 1 << 20;
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Compression method zip entries are written with, chosen once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipCapabilities {
    method: CompressionMethod,
}

impl ZipCapabilities {
    /// Write a small deflated entry into memory and fall back to stored entries if
    /// that fails.
    #[must_use]
    pub fn probe() -> Self {
        let method = if deflate_works() {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        Self { method }
    }

    /// Capabilities that always store entries uncompressed.
    #[must_use]
    pub const fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
        }
    }

    /// Method applied to every file entry.
    #[must_use]
    pub const fn method(self) -> CompressionMethod {
        self.method
    }
}

fn deflate_works() -> bool {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("probe", options).is_ok()
        && writer.write_all(b"capability probe").is_ok()
        && writer.finish().is_ok()
}

/// Everything needed to write one container.
#[derive(Debug, Clone, Copy)]
pub struct ContainerRequest<'a> {
    /// Container format.
    pub kind: ContainerKind,
    /// Final container path; the scratch file is created beside it.
    pub target: &'a Path,
    /// Files to archive, relative to `working_root`.
    pub entries: &'a [FileEntry],
    /// Directory entry paths are relative to.
    pub working_root: &'a Path,
    /// Persisted manifest to embed first and then remove.
    pub manifest_path: &'a Path,
    /// Zip compression method.
    pub zip: ZipCapabilities,
}

/// Write the container described by `request` into a scratch artifact.
///
/// # Errors
///
/// Returns [`PackError::Interrupted`] with [`Stage::Archive`] when the interrupt
/// flag is raised mid-write, or the underlying IO/zip error. The scratch artifact
/// and the manifest file are removed in both cases.
pub fn build_container(
    request: &ContainerRequest<'_>,
    interrupt: &Interrupt,
    log: &Transcript,
) -> PackResult<Artifact> {
    let (file, artifact) = Artifact::create_beside(request.target)?;
    let written = interrupt
        .check(Stage::Archive)
        .and_then(|()| match request.kind {
            ContainerKind::Tar => write_tar(file, request, interrupt),
            ContainerKind::Zip => write_zip(file, request, interrupt),
        });
    match written {
        Ok(()) => {
            log.info(format!(
                "wrote {} container with {} entries plus manifest",
                request.kind.suffix(),
                request.entries.len()
            ));
            Ok(artifact)
        }
        Err(error) => {
            if request.manifest_path.exists() {
                if let Err(cleanup) = consume_manifest(request.manifest_path) {
                    log.warn(format!("failed to remove manifest: {}", cleanup.describe()));
                }
            }
            if let Err(cleanup) = artifact.discard() {
                log.warn(format!("failed to remove partial container: {}", cleanup.describe()));
            }
            Err(error)
        }
    }
}

fn manifest_name(manifest_path: &Path) -> PackResult<String> {
    manifest_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PackError::io(
                "archive.manifest_name",
                manifest_path,
                io::Error::new(io::ErrorKind::InvalidInput, "manifest path has no file name"),
            )
        })
}

fn consume_manifest(manifest_path: &Path) -> PackResult<()> {
    fs::remove_file(manifest_path)
        .map_err(|source| PackError::io("archive.remove_manifest", manifest_path, source))
}

fn write_tar(file: File, request: &ContainerRequest<'_>, interrupt: &Interrupt) -> PackResult<()> {
    let target = request.target;
    let mut builder = TarBuilder::new(BufWriter::with_capacity(WRITE_BUFFER, file));
    builder.follow_symlinks(false);

    builder
        .append_path_with_name(request.manifest_path, manifest_name(request.manifest_path)?)
        .map_err(|source| PackError::io("archive.append_manifest", request.manifest_path, source))?;
    consume_manifest(request.manifest_path)?;

    for entry in request.entries {
        interrupt.check(Stage::Archive)?;
        let source = entry.absolute(request.working_root);
        let appended = if is_symlink(&source) {
            builder.append_path_with_name(&source, entry.path())
        } else {
            append_file(&mut builder, &source, entry, interrupt)
        };
        appended.map_err(|error| {
            interrupt.classify(Stage::Archive, "archive.append_entry", &source, error)
        })?;
    }

    let writer = builder
        .into_inner()
        .map_err(|source| interrupt.classify(Stage::Archive, "archive.finish", target, source))?;
    let file = writer
        .into_inner()
        .map_err(|source| PackError::io("archive.flush", target, source.into_error()))?;
    file.sync_all()
        .map_err(|source| PackError::io("archive.sync", target, source))
}

fn append_file<W: Write>(
    builder: &mut TarBuilder<W>,
    source: &Path,
    entry: &FileEntry,
    interrupt: &Interrupt,
) -> io::Result<()> {
    let file = File::open(source)?;
    let metadata = file.metadata()?;
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
    builder.append_data(&mut header, entry.path(), Interruptible::new(file, interrupt))
}

fn write_zip(file: File, request: &ContainerRequest<'_>, interrupt: &Interrupt) -> PackResult<()> {
    let target = request.target;
    let zip_error = |operation, source| PackError::zip(operation, target, source);
    let options = FileOptions::default().compression_method(request.zip.method());
    let mut writer = ZipWriter::new(BufWriter::with_capacity(WRITE_BUFFER, file));

    writer
        .start_file(manifest_name(request.manifest_path)?, options)
        .map_err(|source| zip_error("archive.start_manifest", source))?;
    let mut manifest = File::open(request.manifest_path)
        .map_err(|source| PackError::io("archive.open_manifest", request.manifest_path, source))?;
    io::copy(&mut manifest, &mut writer)
        .map_err(|source| PackError::io("archive.append_manifest", request.manifest_path, source))?;
    drop(manifest);
    consume_manifest(request.manifest_path)?;

    for entry in request.entries {
        interrupt.check(Stage::Archive)?;
        let source = entry.absolute(request.working_root);
        let name = entry.archive_name();
        if is_symlink(&source) {
            let link = fs::read_link(&source)
                .map_err(|error| PackError::io("archive.read_link", &source, error))?;
            writer
                .add_symlink(name, link.to_string_lossy(), options)
                .map_err(|source| zip_error("archive.add_symlink", source))?;
            continue;
        }

        let file = File::open(&source)
            .map_err(|error| PackError::io("archive.open_entry", &source, error))?;
        let metadata = file
            .metadata()
            .map_err(|error| PackError::io("archive.stat_entry", &source, error))?;
        writer
            .start_file(name, entry_options(options, &metadata))
            .map_err(|source| zip_error("archive.start_entry", source))?;
        io::copy(&mut Interruptible::new(file, interrupt), &mut writer).map_err(|error| {
            interrupt.classify(Stage::Archive, "archive.append_entry", &source, error)
        })?;
    }

    let buffered = writer
        .finish()
        .map_err(|source| zip_error("archive.finish", source))?;
    let file = buffered
        .into_inner()
        .map_err(|source| PackError::io("archive.flush", target, source.into_error()))?;
    file.sync_all()
        .map_err(|source| PackError::io("archive.sync", target, source))
}

fn entry_options(options: FileOptions, metadata: &fs::Metadata) -> FileOptions {
    let options = options.large_file(metadata.len() >= ZIP64_THRESHOLD);
    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        options.unix_permissions(metadata.permissions().mode())
    };
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::testing::{raise_once_scratch_exceeds, write_noise};
    use crate::model::Manifest;
    use anyhow::Result;
    use std::io::Read;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        entries: Vec<FileEntry>,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let temp = tempfile::Builder::new().prefix("stowage-archive-").tempdir()?;
            fs::create_dir_all(temp.path().join("run/nested"))?;
            fs::create_dir_all(temp.path().join("out"))?;
            fs::write(temp.path().join("run/a.txt"), b"alpha")?;
            fs::write(temp.path().join("run/nested/b.txt"), b"bravo")?;
            fs::write(temp.path().join("out/run.md5.txt"), "manifest\n")?;
            let entries = vec![FileEntry::new("run/a.txt"), FileEntry::new("run/nested/b.txt")];
            Ok(Self { temp, entries })
        }

        fn manifest_path(&self) -> std::path::PathBuf {
            self.temp.path().join("out/run.md5.txt")
        }

        fn request<'a>(
            &'a self,
            kind: ContainerKind,
            target: &'a Path,
            manifest: &'a Path,
        ) -> ContainerRequest<'a> {
            ContainerRequest {
                kind,
                target,
                entries: &self.entries,
                working_root: self.temp.path(),
                manifest_path: manifest,
                zip: ZipCapabilities::probe(),
            }
        }
    }

    #[test]
    fn probe_prefers_deflate() {
        assert_eq!(ZipCapabilities::probe().method(), CompressionMethod::Deflated);
        assert_eq!(ZipCapabilities::stored().method(), CompressionMethod::Stored);
    }

    #[test]
    fn tar_container_lists_manifest_first_and_consumes_it() -> Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.temp.path().join("out/run.tar");
        let manifest = fixture.manifest_path();

        let artifact = build_container(
            &fixture.request(ContainerKind::Tar, &target, &manifest),
            &Interrupt::new(),
            &Transcript::sink("run"),
        )?;
        assert!(!manifest.exists());

        let mut archive = tar::Archive::new(File::open(artifact.path())?);
        let mut names = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if name == "run/nested/b.txt" {
                let mut body = String::new();
                entry.read_to_string(&mut body)?;
                assert_eq!(body, "bravo");
            }
            names.push(name);
        }
        assert_eq!(names, ["run.md5.txt", "run/a.txt", "run/nested/b.txt"]);
        Ok(())
    }

    #[test]
    fn zip_container_holds_manifest_and_entries() -> Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.temp.path().join("out/run.zip");
        let manifest = fixture.manifest_path();

        let artifact = build_container(
            &fixture.request(ContainerKind::Zip, &target, &manifest),
            &Interrupt::new(),
            &Transcript::sink("run"),
        )?;
        assert!(!manifest.exists());

        let mut archive = zip::ZipArchive::new(File::open(artifact.path())?)?;
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.by_index(0)?.name(), "run.md5.txt");
        let mut body = String::new();
        archive.by_name("run/a.txt")?.read_to_string(&mut body)?;
        assert_eq!(body, "alpha");
        Ok(())
    }

    #[test]
    fn interrupt_leaves_no_scratch_or_final_file() -> Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.temp.path().join("out/run.tar");
        let manifest = fixture.manifest_path();
        let interrupt = Interrupt::new();
        interrupt.raise();

        let result = build_container(
            &fixture.request(ContainerKind::Tar, &target, &manifest),
            &interrupt,
            &Transcript::sink("run"),
        );
        assert!(matches!(
            result,
            Err(PackError::Interrupted {
                stage: Stage::Archive
            })
        ));
        let leftovers: Vec<_> = fs::read_dir(fixture.temp.path().join("out"))?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
        Ok(())
    }

    fn interrupt_while_streaming(kind: ContainerKind) -> Result<()> {
        let fixture = Fixture::new()?;
        write_noise(&fixture.temp.path().join("run/large.bin"), 48)?;
        let entries = vec![FileEntry::new("run/large.bin")];
        let out = fixture.temp.path().join("out");
        let target = out.join(format!("run.{}", kind.suffix()));
        let manifest = fixture.manifest_path();
        let request = ContainerRequest {
            entries: &entries,
            ..fixture.request(kind, &target, &manifest)
        };
        let interrupt = Interrupt::new();
        let watcher = raise_once_scratch_exceeds(out.clone(), 1 << 20, interrupt.clone());

        let result = build_container(&request, &interrupt, &Transcript::sink("run"));
        let fired = watcher
            .join()
            .map_err(|_| anyhow::anyhow!("interrupt thread panicked"))?;
        assert!(fired);
        assert!(matches!(
            result,
            Err(PackError::Interrupted {
                stage: Stage::Archive
            })
        ));
        let leftovers: Vec<_> = fs::read_dir(&out)?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
        Ok(())
    }

    #[test]
    fn interrupt_during_tar_stream_discards_scratch() -> Result<()> {
        interrupt_while_streaming(ContainerKind::Tar)
    }

    #[test]
    fn interrupt_during_zip_stream_discards_scratch() -> Result<()> {
        interrupt_while_streaming(ContainerKind::Zip)
    }

    #[test]
    fn failure_mid_write_removes_scratch_and_manifest() -> Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.temp.path().join("out/run.tar");
        let manifest = fixture.manifest_path();
        let mut entries = fixture.entries.clone();
        entries.push(FileEntry::new("run/vanished.txt"));
        let request = ContainerRequest {
            entries: &entries,
            ..fixture.request(ContainerKind::Tar, &target, &manifest)
        };

        let result = build_container(&request, &Interrupt::new(), &Transcript::sink("run"));
        assert!(matches!(result, Err(PackError::Io { .. })));
        assert!(!manifest.exists());
        let scratch = fs::read_dir(fixture.temp.path().join("out"))?
            .filter_map(Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().ends_with(".partial"));
        assert!(!scratch);
        Ok(())
    }

    #[test]
    fn embedded_manifest_round_trips() -> Result<()> {
        let fixture = Fixture::new()?;
        let manifest = Manifest::default();
        manifest.persist(&fixture.manifest_path())?;
        let target = fixture.temp.path().join("out/run.tar");
        let manifest_path = fixture.manifest_path();
        let artifact = build_container(
            &fixture.request(ContainerKind::Tar, &target, &manifest_path),
            &Interrupt::new(),
            &Transcript::sink("run"),
        )?;

        let mut archive = tar::Archive::new(File::open(artifact.path())?);
        let mut first = archive
            .entries()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty archive"))??;
        let mut text = String::new();
        first.read_to_string(&mut text)?;
        assert_eq!(Manifest::parse(&text)?, manifest);
        Ok(())
    }
}
