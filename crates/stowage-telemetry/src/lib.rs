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

//! Logging primitives shared across the stowage workspace.
//!
//! Layout: `init.rs` (global subscriber installation), `transcript.rs` (per-source
//! log files passed explicitly through the pipeline), `error.rs`.

pub mod error;
pub mod init;
pub mod transcript;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
pub use transcript::Transcript;
