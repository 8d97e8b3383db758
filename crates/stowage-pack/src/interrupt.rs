//! Cooperative cancellation.
//!
//! # Design
//! - A single shared flag is raised by the signal listener and polled by streaming
//!   stages; no stage is torn down from the outside.
//! - Readers wrapped in [`Interruptible`] fail their next read once the flag is
//!   raised, so long copies stop promptly.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{PackError, PackResult, Stage};

/// Shared interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// Fresh, unraised flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that in-flight work stop.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt was requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Fail with [`PackError::Interrupted`] for `stage` if the flag is raised.
    ///
    /// # Errors
    ///
    /// Returns the stage-specific interrupt error.
    pub fn check(&self, stage: Stage) -> PackResult<()> {
        if self.is_raised() {
            Err(PackError::Interrupted { stage })
        } else {
            Ok(())
        }
    }

    /// Spawn a task that raises the flag on Ctrl-C (and SIGTERM on Unix).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn listen(&self) -> JoinHandle<()> {
        let interrupt = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            warn!("interrupt received; cleaning up in-flight artifacts");
            interrupt.raise();
        })
    }

    /// Map a streaming IO failure to the stage interrupt when the flag caused it.
    pub(crate) fn classify(
        &self,
        stage: Stage,
        operation: &'static str,
        path: &std::path::Path,
        source: io::Error,
    ) -> PackError {
        if self.is_raised() {
            PackError::Interrupted { stage }
        } else {
            PackError::io(operation, path, source)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(error) = result {
                        warn!(error = %error, "ctrl-c listener failed; waiting for SIGTERM only");
                        terminate.recv().await;
                    }
                }
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            warn!(error = %error, "SIGTERM listener unavailable; waiting for ctrl-c only");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "ctrl-c listener unavailable; interrupts disabled");
        std::future::pending::<()>().await;
    }
}

/// Reader that fails once the interrupt flag is raised.
pub(crate) struct Interruptible<'a, R> {
    inner: R,
    interrupt: &'a Interrupt,
}

impl<'a, R> Interruptible<'a, R> {
    pub(crate) const fn new(inner: R, interrupt: &'a Interrupt) -> Self {
        Self { inner, interrupt }
    }
}

impl<R: Read> Read for Interruptible<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt.is_raised() {
            // `ErrorKind::Interrupted` would be retried by `io::copy`.
            return Err(io::Error::other("interrupt raised"));
        }
        self.inner.read(buf)
    }
}
