//! CrashOps - Embedded crash capture and delivery
//!
//! Create one [`CrashOps`] context at process start and keep it for the
//! lifetime of the process. It owns every component:
//!
//! - the report store (`crashops-store`)
//! - the panic capture handler (`crashops-capture`)
//! - the delivery scheduler and its readiness gate (`crashops-delivery`)
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use crashops::{Config, CrashOps, Scalar};
//!
//! # fn example(runtime: tokio::runtime::Handle) -> Result<(), crashops::CrashOpsError> {
//! let crashops = CrashOps::builder(Config::default())
//!     .app("my-app", "1.4.2")
//!     .start(runtime)?;
//!
//! let metadata = BTreeMap::from([("screen".to_string(), Scalar::from("checkout"))]);
//! crashops.set_metadata(metadata, true);
//! # Ok(())
//! # }
//! ```

mod context;
mod presence;
mod previous;

pub use context::{CrashOps, CrashOpsBuilder, CrashOpsError};
pub use presence::PresencePayload;
pub use previous::PreviousReportsListener;

pub use crashops_capture::CrashListener;
pub use crashops_core::config::Config;
pub use crashops_core::domain::{CrashReport, ReportId, Scalar, SessionId, StackFrame, StoredReport};
pub use crashops_core::ports::{HostContext, IRemoteTransport, IReportStore};
pub use crashops_delivery::RunOutcome;
