//! Bounded fan-out of blocking work.
//!
//! # Design
//! - A semaphore bounds how many units run at once; each unit runs on the blocking
//!   thread pool and holds an owned permit until it returns.
//! - Collection waits for every dispatched unit, so no stage proceeds with work
//!   still in flight.
//! - Completion order is not preserved; callers reduce or sort the results.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{PackError, PackResult, Stage};
use crate::interrupt::Interrupt;

/// Named pool with a fixed concurrency bound.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    permits: Arc<Semaphore>,
    interrupt: Interrupt,
}

impl WorkerPool {
    /// Pool running at most `size` units at once (minimum one).
    #[must_use]
    pub fn new(name: &'static str, size: usize, interrupt: Interrupt) -> Self {
        let size = size.max(1);
        Self {
            name,
            size,
            permits: Arc::new(Semaphore::new(size)),
            interrupt,
        }
    }

    /// Pool name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Concurrency bound.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Interrupt flag consulted before each dispatch.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Run `work` over every item and collect the results in completion order.
    ///
    /// Dispatch stops once the interrupt flag is raised; units already running are
    /// awaited before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Interrupted`] for `stage` if the flag was raised,
    /// otherwise the first unit error or join failure observed.
    pub async fn map<T, R, F>(&self, items: Vec<T>, stage: Stage, work: F) -> PackResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> PackResult<R> + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let mut tasks = JoinSet::new();
        let mut halted = false;
        for item in items {
            if self.interrupt.is_raised() {
                halted = true;
                break;
            }
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| PackError::PoolClosed { pool: self.name })?;
            let work = Arc::clone(&work);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                work(item)
            });
        }
        debug!(pool = self.name, units = tasks.len(), "fan-out dispatched");

        let mut results = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(error)) => {
                    first_error.get_or_insert(error);
                }
                Err(source) => {
                    first_error.get_or_insert(PackError::Join {
                        pool: self.name,
                        source,
                    });
                }
            }
        }

        if halted || self.interrupt.is_raised() {
            return Err(PackError::Interrupted { stage });
        }
        first_error.map_or(Ok(results), Err)
    }
}
