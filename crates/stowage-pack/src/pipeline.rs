//! Per-source orchestration of the packaging stages.
//!
//! # Design
//! - One control task drives each source set through enumerate, size, hash,
//!   archive, place, and (optionally) compress, strictly in that order.
//! - Destinations of every set are checked before the first set is touched.
//! - Deferred compression jobs are queued while sets are processed and drained in a
//!   single pass once every container is placed.
//! - Each set gets its own transcript, passed explicitly to every stage.

use std::{
    fs,
    path::{Path, PathBuf},
};

use stowage_config::{RunConfig, SourceSet};
use stowage_telemetry::Transcript;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::archive::{ContainerRequest, ZipCapabilities, build_container};
use crate::compress::{CompressionStats, compress_artifact, run_deferred};
use crate::enumerate::enumerate;
use crate::error::{PackError, PackResult, Stage};
use crate::hash::compute_manifest;
use crate::interrupt::Interrupt;
use crate::model::DeferredJob;
use crate::place::{place, preflight};
use crate::pool::WorkerPool;
use crate::size::total_size;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Enumerate,
    Size,
    Hash,
    PersistManifest,
    Archive,
    PlaceContainer,
    Compress,
    DeleteSource,
}

impl Step {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Enumerate => "enumerate",
            Self::Size => "size",
            Self::Hash => "hash",
            Self::PersistManifest => "persist_manifest",
            Self::Archive => "archive",
            Self::PlaceContainer => "place_container",
            Self::Compress => "compress",
            Self::DeleteSource => "delete_source",
        }
    }
}

/// Switches and pool sizes for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Queue compression until every container is placed.
    pub defer_compression: bool,
    /// Remove each source directory once its container is placed.
    pub delete_source: bool,
    /// Replace pre-existing outputs.
    pub overwrite: bool,
    /// Hashing pool size.
    pub cpu_workers: usize,
    /// Metadata and deferred-compression pool size.
    pub io_workers: usize,
}

impl From<&RunConfig> for PackOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            defer_compression: config.defer_compression,
            delete_source: config.delete_source,
            overwrite: config.overwrite,
            cpu_workers: config.cpu_workers,
            io_workers: config.io_workers,
        }
    }
}

/// Summary of one packaged source set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReport {
    /// Source set name.
    pub name: String,
    /// Placed container path.
    pub container: PathBuf,
    /// Final archive path.
    pub archive: PathBuf,
    /// Number of archived entries, excluding the manifest.
    pub files: usize,
    /// Total entry bytes before archiving.
    pub total_bytes: u64,
    /// Immediate compression result.
    pub compression: Option<CompressionStats>,
    /// Compression queued for the end of the run.
    pub deferred: Option<DeferredJob>,
    /// Whether the source directory was removed.
    pub source_deleted: bool,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Identifier attached to every log event of the run.
    pub run_id: Uuid,
    /// Per-set summaries in processing order.
    pub sets: Vec<SetReport>,
    /// Results of the deferred compression pass.
    pub deferred: Vec<CompressionStats>,
}

impl RunReport {
    /// Every compression performed, immediate or deferred.
    pub fn compressions(&self) -> impl Iterator<Item = &CompressionStats> {
        self.sets
            .iter()
            .filter_map(|set| set.compression.as_ref())
            .chain(&self.deferred)
    }
}

/// Drives source sets through the packaging stages.
#[derive(Debug)]
pub struct Packager {
    options: PackOptions,
    config_json: String,
    size_pool: WorkerPool,
    hash_pool: WorkerPool,
    compress_pool: WorkerPool,
    zip: ZipCapabilities,
    interrupt: Interrupt,
}

impl Packager {
    /// Build pools for `config` and probe zip capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Config`] if the configuration is invalid or cannot be
    /// rendered for transcripts.
    pub fn new(config: &RunConfig, interrupt: Interrupt) -> PackResult<Self> {
        config.validate().map_err(|source| PackError::Config { source })?;
        let options = PackOptions::from(config);
        let config_json = config.to_json().map_err(|source| PackError::Config { source })?;
        Ok(Self {
            options,
            config_json,
            size_pool: WorkerPool::new("size", options.io_workers, interrupt.clone()),
            hash_pool: WorkerPool::new("hash", options.cpu_workers, interrupt.clone()),
            compress_pool: WorkerPool::new("compress", options.io_workers, interrupt.clone()),
            zip: ZipCapabilities::probe(),
            interrupt,
        })
    }

    /// Override the probed zip capabilities.
    #[must_use]
    pub fn with_zip_capabilities(mut self, zip: ZipCapabilities) -> Self {
        self.zip = zip;
        self
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> PackOptions {
        self.options
    }

    /// Package every set, then drain deferred compression.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; remaining sets are not processed.
    pub async fn run(&self, sets: &[SourceSet]) -> PackResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pack_run", run_id = %run_id, sets = sets.len());
        self.run_sets(sets, run_id).instrument(span).await
    }

    async fn run_sets(&self, sets: &[SourceSet], run_id: Uuid) -> PackResult<RunReport> {
        preflight(sets, self.options.overwrite)?;

        let mut reports = Vec::with_capacity(sets.len());
        let mut queue = Vec::new();
        for set in sets {
            self.interrupt.check(Stage::Scan)?;
            let report = self.stage_set(set).await?;
            queue.extend(report.deferred.clone());
            reports.push(report);
        }

        let deferred = self.drain_deferred(queue).await?;
        info!(sets = reports.len(), deferred = deferred.len(), "packaging run completed");
        Ok(RunReport {
            run_id,
            sets: reports,
            deferred,
        })
    }

    /// Process one set up to a placed container, compressing immediately unless
    /// compression is deferred.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; it is also written to the set's transcript.
    pub async fn stage_set(&self, set: &SourceSet) -> PackResult<SetReport> {
        let log = Transcript::create(set.name(), &set.log_path())
            .map_err(|source| PackError::Transcript { source })?;
        log.info(format!(
            "packaging {} into {}",
            set.source().display(),
            set.archive_path().display()
        ));
        log.info(format!("run configuration: {}", self.config_json));

        let result = self.package(set, &log).await;
        match &result {
            Ok(report) => log.info(format!(
                "finished {}: {} files, {} bytes",
                report.name, report.files, report.total_bytes
            )),
            Err(error) => log.error(format!(
                "packaging {} failed: {}",
                set.name(),
                error.describe()
            )),
        }
        result
    }

    /// Compress every queued job on the compression pool.
    ///
    /// # Errors
    ///
    /// Returns the first job failure or the compression interrupt.
    pub async fn drain_deferred(
        &self,
        jobs: Vec<DeferredJob>,
    ) -> PackResult<Vec<CompressionStats>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        info!(jobs = jobs.len(), "draining deferred compression");
        run_deferred(jobs, &self.compress_pool, |job| {
            Transcript::append(job.label.clone(), &job.transcript)
                .map_err(|source| PackError::Transcript { source })
        })
        .await
    }

    async fn package(&self, set: &SourceSet, log: &Transcript) -> PackResult<SetReport> {
        let root = set.working_root().to_path_buf();

        record(log, Step::Enumerate, "started");
        let entries = blocking("enumerate", {
            let (root, source, log) = (root.clone(), set.source().to_path_buf(), log.clone());
            move || enumerate(&root, &source, &log)
        })
        .await
        .map_err(|error| failed(log, Step::Enumerate, error))?;
        record(log, Step::Enumerate, &format!("completed files={}", entries.len()));

        record(log, Step::Size, "started");
        let total_bytes = total_size(&entries, &root, &self.size_pool, log)
            .await
            .map_err(|error| failed(log, Step::Size, error))?;
        record(log, Step::Size, &format!("completed bytes={total_bytes}"));

        record(log, Step::Hash, "started");
        let manifest = compute_manifest(&entries, &root, &self.hash_pool, log)
            .await
            .map_err(|error| failed(log, Step::Hash, error))?;
        record(log, Step::Hash, &format!("completed entries={}", manifest.len()));

        let manifest_path = set.manifest_path();
        manifest
            .persist(&manifest_path)
            .map_err(|error| failed(log, Step::PersistManifest, error))?;
        record(log, Step::PersistManifest, "completed");

        record(log, Step::Archive, "started");
        let files = entries.len();
        let container_path = set.container_path();
        let artifact = blocking("archive", {
            let kind = set.extension().container();
            let target = container_path.clone();
            let zip = self.zip;
            let interrupt = self.interrupt.clone();
            let log = log.clone();
            move || {
                let request = ContainerRequest {
                    kind,
                    target: &target,
                    entries: &entries,
                    working_root: &root,
                    manifest_path: &manifest_path,
                    zip,
                };
                build_container(&request, &interrupt, &log)
            }
        })
        .await
        .map_err(|error| failed(log, Step::Archive, error))?;
        record(log, Step::Archive, "completed");

        let placed = place(artifact, &container_path, log)
            .map_err(|error| failed(log, Step::PlaceContainer, error))?;
        record(log, Step::PlaceContainer, "completed");

        let mut compression = None;
        let mut deferred = None;
        if let Some(kind) = set.compression() {
            let job = DeferredJob {
                intermediate: placed.path().to_path_buf(),
                destination: set.archive_path(),
                kind,
                label: set.name().to_string(),
                transcript: set.log_path(),
            };
            if self.options.defer_compression {
                log.info(format!("compression to {} deferred", job.destination.display()));
                deferred = Some(job);
            } else {
                record(log, Step::Compress, "started");
                let stats = blocking("compress", {
                    let interrupt = self.interrupt.clone();
                    let log = log.clone();
                    move || {
                        compress_artifact(
                            &job.intermediate,
                            &job.destination,
                            job.kind,
                            &interrupt,
                            &log,
                        )
                    }
                })
                .await
                .map_err(|error| failed(log, Step::Compress, error))?;
                record(log, Step::Compress, "completed");
                compression = Some(stats);
            }
        }

        let source_deleted = if self.options.delete_source {
            delete_source(set.source(), log)
                .await
                .map_err(|error| failed(log, Step::DeleteSource, error))?;
            true
        } else {
            false
        };

        Ok(SetReport {
            name: set.name().to_string(),
            container: placed.into_path(),
            archive: set.archive_path(),
            files,
            total_bytes,
            compression,
            deferred,
            source_deleted,
        })
    }
}

fn record(log: &Transcript, step: Step, status: &str) {
    log.info(format!("step={} {status}", step.as_str()));
}

fn failed(log: &Transcript, step: Step, error: PackError) -> PackError {
    log.warn(format!("step={} failed", step.as_str()));
    error
}

async fn delete_source(source: &Path, log: &Transcript) -> PackResult<()> {
    let target = source.to_path_buf();
    blocking("delete_source", move || {
        fs::remove_dir_all(&target).map_err(|error| PackError::io("delete_source", &target, error))
    })
    .await?;
    log.info(format!("removed source directory {}", source.display()));
    Ok(())
}

async fn blocking<R, F>(pool: &'static str, work: F) -> PackResult<R>
where
    R: Send + 'static,
    F: FnOnce() -> PackResult<R> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|source| PackError::Join { pool, source })?
}
