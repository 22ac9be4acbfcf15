//! CrashOps Capture - Uncaught failure interception
//!
//! Installs a process-wide panic hook ahead of whatever hook was registered
//! before, records every panic as a [`CrashReport`] in the report store, and
//! then always forwards the panic to the previous hook so the host's normal
//! termination behaviour is preserved.
//!
//! ## Execution contexts
//!
//! - The failing thread only captures the raw backtrace and panic message.
//! - Symbol resolution and the store write run on the `crashops-io` worker.
//! - The crash listener runs on the `crashops-callbacks` worker.
//!
//! The failing thread waits for each worker with a bounded timeout, so a
//! stuck disk or a slow listener delays termination by at most the
//! configured timeouts.
//!
//! [`CrashReport`]: crashops_core::domain::CrashReport

pub mod frames;
pub mod handler;
pub mod listener;
pub mod worker;

pub use handler::{CaptureOptions, CrashCaptureHandler};
pub use listener::CrashListener;
pub use worker::BackgroundWorker;

use crashops_core::domain::{DomainError, StorageError};

/// Errors surfaced by caller-invoked capture operations
///
/// Panics intercepted by the hook never produce an error; failures there
/// are logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The report could not be built
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The report store rejected the write
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The worker did not answer within the configured timeout
    #[error("Timed out waiting for the {0} worker")]
    Timeout(&'static str),

    /// A worker thread could not be started
    #[error("Failed to start worker thread: {0}")]
    Worker(#[source] std::io::Error),
}
