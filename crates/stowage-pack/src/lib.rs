#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(dead_code, unused, unused_imports)]

//! Directory packaging pipeline: enumerate, size, hash, archive, place, compress.
//!
//! Layout: `model/` (entries, manifest, artifacts), one module per stage
//! (`enumerate`, `size`, `hash`, `archive`, `compress`, `place`), `pool.rs` (bounded
//! fan-out), `interrupt.rs` (cooperative cancellation), `pipeline.rs`
//! (orchestration), `error.rs` and `exit.rs`.

pub mod archive;
pub mod compress;
pub mod enumerate;
pub mod error;
pub mod exit;
pub mod hash;
pub mod interrupt;
pub mod model;
pub mod pipeline;
pub mod place;
pub mod pool;
pub mod size;

pub use archive::{ContainerRequest, ZipCapabilities, build_container};
pub use compress::{CompressionStats, compress_artifact, decompress_to, run_deferred};
pub use error::{PackError, PackResult, PlacementFailure, Stage};
pub use exit::ExitStatus;
pub use interrupt::Interrupt;
pub use model::{
    Artifact, DeferredJob, FileEntry, Manifest, ManifestEntry, PlacedArtifact, SENTINEL_CHECKSUM,
};
pub use pipeline::{PackOptions, Packager, RunReport, SetReport};
pub use pool::WorkerPool;
