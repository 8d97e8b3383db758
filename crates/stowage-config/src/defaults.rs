//! Default worker-pool sizing.
//!
//! # Design
//! - Derive the CPU pool from the host's available parallelism.
//! - Size the I/O pools as a fixed multiple of the CPU pool.

use std::num::NonZeroUsize;
use std::thread;

/// Multiplier applied to the CPU worker count to size metadata and compression pools.
pub const IO_FACTOR: usize = 4;

/// Number of CPU-bound workers used when the caller does not specify one.
#[must_use]
pub fn default_cpu_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Number of I/O-bound workers derived from a CPU worker count.
#[must_use]
pub const fn default_io_workers(cpu_workers: usize) -> usize {
    cpu_workers.saturating_mul(IO_FACTOR)
}
