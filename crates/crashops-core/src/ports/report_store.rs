//! Report store port (driven/secondary port)
//!
//! This module defines the narrow contract through which every other
//! component reads and writes crash reports and settings. Nothing outside
//! the store implementation touches the backing storage directly.
//!
//! ## Design Notes
//!
//! - The trait is synchronous on purpose: it is called from inside the
//!   panic hook, where no async runtime can be assumed to be usable.
//!   Async callers wrap calls in `spawn_blocking`.
//! - Uses [`StorageError`] rather than `anyhow` so the capture path can log
//!   and swallow failures without downcasting.

use crate::domain::{CrashReport, ReportId, Scalar, StorageError, StoredReport};

/// Port trait for the persistent report store
pub trait IReportStore: Send + Sync {
    // --- Reports ---

    /// Durably writes a new report and assigns it the next [`ReportId`]
    ///
    /// Increments the pending-report count. A report is either fully
    /// visible to readers or not visible at all.
    fn append(&self, report: &CrashReport) -> Result<ReportId, StorageError>;

    /// Returns every report with `delivered == false`, oldest first
    fn list_pending(&self) -> Result<Vec<StoredReport>, StorageError>;

    /// Returns every stored report, delivered or not, oldest first
    fn list_all(&self) -> Result<Vec<StoredReport>, StorageError>;

    /// Looks up a single report
    fn get(&self, id: ReportId) -> Result<Option<StoredReport>, StorageError>;

    /// Marks a report delivered
    ///
    /// Idempotent: returns `true` for any known id, including one that was
    /// already delivered, and `false` for an unknown id.
    fn mark_delivered(&self, id: ReportId) -> Result<bool, StorageError>;

    /// Deletes every stored report and every persisted setting override
    ///
    /// Returns `false` on partial failure; the store may then still hold an
    /// unknown subset of its previous content.
    fn clear_all(&self) -> bool;

    /// Number of undelivered reports currently stored
    fn pending_count(&self) -> usize;

    // --- Settings ---

    /// Resolves a setting: in-memory override if present, else `default`
    fn get_setting(&self, key: &str, default: Scalar) -> Scalar;

    /// Updates the in-memory value of a setting, and persists it when
    /// `persist` is true
    fn set_setting(&self, key: &str, value: Scalar, persist: bool) -> Result<(), StorageError>;

    /// Resolves a boolean setting, falling back to `default` when the
    /// stored value is not a boolean
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_setting(key, Scalar::Bool(default))
            .as_bool()
            .unwrap_or(default)
    }
}
