//! Surfacing reports left behind by earlier runs
//!
//! The first delivery run that sends reports from another session records
//! them as this process's previous-run reports. That happens once per
//! process; if a listener is set and capture is enabled at that moment, it
//! is handed the reports on the `crashops-callbacks` thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crashops_capture::CrashCaptureHandler;
use crashops_core::domain::{settings, CrashReport, SessionId, StoredReport};
use crashops_core::ports::IReportStore;
use tracing::{debug, warn};

/// Told about crash reports an earlier run of the application left behind
pub trait PreviousReportsListener: Send + Sync {
    /// Called at most once per process, after the reports were delivered
    fn on_previous_reports(&self, reports: &[CrashReport]);
}

impl<F> PreviousReportsListener for F
where
    F: Fn(&[CrashReport]) + Send + Sync,
{
    fn on_previous_reports(&self, reports: &[CrashReport]) {
        self(reports)
    }
}

pub(crate) struct PreviousReports {
    session_id: SessionId,
    store: Arc<dyn IReportStore>,
    enabled_by_default: bool,
    listener: Mutex<Option<Arc<dyn PreviousReportsListener>>>,
    recorded: AtomicBool,
}

impl PreviousReports {
    pub(crate) fn new(
        session_id: SessionId,
        store: Arc<dyn IReportStore>,
        enabled_by_default: bool,
    ) -> Self {
        Self {
            session_id,
            store,
            enabled_by_default,
            listener: Mutex::new(None),
            recorded: AtomicBool::new(false),
        }
    }

    fn listener(&self) -> MutexGuard<'_, Option<Arc<dyn PreviousReportsListener>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_listener(&self, listener: Option<Arc<dyn PreviousReportsListener>>) {
        *self.listener() = listener;
    }

    /// Handles the reports one delivery run sent
    pub(crate) fn on_delivered(&self, delivered: Vec<StoredReport>, handler: &CrashCaptureHandler) {
        let reports: Vec<CrashReport> = delivered
            .into_iter()
            .map(|stored| stored.report)
            .filter(|report| report.session_id() != self.session_id)
            .collect();
        if reports.is_empty() || self.recorded.swap(true, Ordering::AcqRel) {
            return;
        }

        let count = reports.len();
        let enabled = self
            .store
            .get_bool(settings::ENABLED, self.enabled_by_default);
        let listener = self.listener().clone();
        let Some(listener) = listener.filter(|_| enabled) else {
            debug!(reports = count, "Previous-run reports recorded, nobody to tell");
            return;
        };

        if handler.post_callback(move || listener.on_previous_reports(&reports)) {
            debug!(reports = count, "Previous-run reports surfaced");
        } else {
            warn!(reports = count, "Callback worker stopped, previous-run reports not surfaced");
        }
    }
}
