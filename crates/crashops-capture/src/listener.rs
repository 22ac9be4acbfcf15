//! Crash listener callback

use crashops_core::domain::CrashReport;

/// Receives every report built by the panic hook
///
/// Called on the `crashops-callbacks` thread after the report was handed to
/// the store, and before the panic is forwarded to the previous hook.
/// Closures taking `&CrashReport` implement this trait.
pub trait CrashListener: Send + Sync {
    fn on_crash(&self, report: &CrashReport);
}

impl<F> CrashListener for F
where
    F: Fn(&CrashReport) + Send + Sync,
{
    fn on_crash(&self, report: &CrashReport) {
        self(report)
    }
}
