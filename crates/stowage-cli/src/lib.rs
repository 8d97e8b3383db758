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
#![allow(clippy::redundant_pub_crate)]

//! Command-line entry point for the stowage packaging pipeline.
//!
//! Layout:
//! - `cli.rs`: argument parsing, configuration assembly, and the run loop
//! - `error.rs`: CLI error type and exit-code mapping
//! - `output.rs`: run summary rendering
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod error;
pub(crate) mod output;

pub use cli::run;
