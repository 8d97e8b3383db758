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

//! Validated run configuration for the packaging pipeline.
//!
//! Layout: `model.rs` (extensions, source sets, run configuration), `validate.rs`
//! (input checks and source-set resolution), `defaults.rs` (pool sizing defaults).

pub mod defaults;
pub mod error;
pub mod model;
mod validate;

pub use defaults::{IO_FACTOR, default_cpu_workers, default_io_workers};
pub use error::{ConfigError, ConfigResult};
pub use model::{
    ArchiveExtension, CompressionKind, ContainerKind, DestinationSpec, RunConfig, SourceSet,
};
