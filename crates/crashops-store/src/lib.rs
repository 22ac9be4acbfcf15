//! CrashOps Store - Durable report and settings persistence
//!
//! File-based implementation of the `IReportStore` port from `crashops-core`.
//! The store is fully synchronous so it can be driven from the panic hook's
//! background worker without an async runtime.
//!
//! ## On-disk layout
//!
//! ```text
//! <data_dir>/
//! ├── reports/
//! │   ├── 00000000000000000001.json   { "id": 1, "report": { ... } }
//! │   └── 00000000000000000002.json
//! └── settings.json                   { "crashops.enabled": false, ... }
//! ```
//!
//! Every file is replaced atomically (temp file in the same directory,
//! `fsync`, rename), so a reader never observes a half-written record.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use crashops_core::ports::IReportStore;
//! use crashops_store::FileReportStore;
//!
//! # fn example() -> Result<(), crashops_core::domain::StorageError> {
//! let store = FileReportStore::open(Path::new("/home/user/.local/share/crashops"))?;
//! println!("{} pending reports", store.pending_count());
//! # Ok(())
//! # }
//! ```

mod atomic;
pub mod file_store;

pub use file_store::FileReportStore;
