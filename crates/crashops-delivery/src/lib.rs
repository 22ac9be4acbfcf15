//! CrashOps Delivery - Getting reports off the device
//!
//! ## Components
//!
//! - [`DeliveryScheduler`] - Single-flight worker that delivers pending
//!   reports oldest-first and registers itself with the host scheduler
//! - [`FanInSynchronizer`] - Join barrier with trailing-edge debounce, used
//!   to wait for several readiness signals before the first run
//! - [`TokioHostScheduler`] - Periodic job runner implementing `IHostScheduler`
//! - [`HttpTransport`] - `IRemoteTransport` over HTTPS
//!
//! All async work runs on the tokio runtime handle passed in at
//! construction; store calls are moved to `spawn_blocking`.

pub mod host;
pub mod http;
pub mod scheduler;
pub mod synchronizer;

pub use host::TokioHostScheduler;
pub use http::HttpTransport;
pub use scheduler::{DeliveryObserver, DeliveryScheduler, RunOutcome, JOB_NAME};
pub use synchronizer::{FanInSynchronizer, Holder};
