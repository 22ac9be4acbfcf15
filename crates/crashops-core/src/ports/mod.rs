//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! CrashOps core. The capture handler and the delivery scheduler depend on
//! these traits; the implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IReportStore`] - Durable storage for crash reports and setting overrides
//! - [`IRemoteTransport`] - Delivery of reports and presence payloads to the collector
//! - [`IHostScheduler`] - Periodic job registration offered by the host process
//! - [`HostContext`] - Non-owning handle to the host process context

pub mod host;
pub mod report_store;
pub mod transport;

pub use host::{HostContext, IHostScheduler, ScheduledJob};
pub use report_store::IReportStore;
pub use transport::IRemoteTransport;
