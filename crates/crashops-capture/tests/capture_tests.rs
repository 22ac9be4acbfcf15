//! Integration tests for CrashCaptureHandler
//!
//! The panic hook is process-wide, so every test here serialises on
//! `HOOK_LOCK` and installs its own recording hook as the "previous" hook.

use std::collections::BTreeMap;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crashops_capture::{CaptureOptions, CrashCaptureHandler, CrashListener};
use crashops_core::domain::{
    CrashReport, ReportId, Scalar, SessionId, StorageError, StoredReport,
};
use crashops_core::ports::IReportStore;
use crashops_store::FileReportStore;

// ============================================================================
// Test helpers
// ============================================================================

static HOOK_LOCK: Mutex<()> = Mutex::new(());

fn serialise() -> MutexGuard<'static, ()> {
    HOOK_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn options() -> CaptureOptions {
    CaptureOptions {
        persist_timeout: Duration::from_secs(10),
        listener_timeout: Duration::from_secs(5),
        collect_traces: true,
    }
}

fn payload_text(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default()
}

/// Installs a hook that records panic messages, standing in for whatever
/// hook the host had registered before CrashOps
fn install_recording_hook() -> Arc<Mutex<Vec<String>>> {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    panic::set_hook(Box::new(move |info| {
        recorded.lock().unwrap().push(payload_text(info));
    }));
    calls
}

fn reset_hook() {
    drop(panic::take_hook());
}

fn trigger(message: &'static str) {
    let result = panic::catch_unwind(|| {
        panic!("{}", message);
    });
    assert!(result.is_err());
}

fn open_store() -> (tempfile::TempDir, Arc<FileReportStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileReportStore::open(dir.path()).unwrap());
    (dir, store)
}

/// A store whose writes always fail
struct BrokenStore;

impl IReportStore for BrokenStore {
    fn append(&self, _report: &CrashReport) -> Result<ReportId, StorageError> {
        Err(StorageError::io(
            "writing report",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        ))
    }
    fn list_pending(&self) -> Result<Vec<StoredReport>, StorageError> {
        Ok(Vec::new())
    }
    fn list_all(&self) -> Result<Vec<StoredReport>, StorageError> {
        Ok(Vec::new())
    }
    fn get(&self, _id: ReportId) -> Result<Option<StoredReport>, StorageError> {
        Ok(None)
    }
    fn mark_delivered(&self, _id: ReportId) -> Result<bool, StorageError> {
        Ok(false)
    }
    fn clear_all(&self) -> bool {
        true
    }
    fn pending_count(&self) -> usize {
        0
    }
    fn get_setting(&self, _key: &str, default: Scalar) -> Scalar {
        default
    }
    fn set_setting(&self, _key: &str, _value: Scalar, _persist: bool) -> Result<(), StorageError> {
        Ok(())
    }
}

// ============================================================================
// Handler chaining
// ============================================================================

#[test]
fn test_panic_is_persisted_and_forwarded_to_previous_hook() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.install();
    trigger("NullPointer");

    assert_eq!(store.pending_count(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["NullPointer".to_string()]);

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_uninstall_restores_previous_hook() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.install();
    assert!(handler.is_installed());
    handler.uninstall();
    assert!(!handler.is_installed());

    // Second uninstall is a no-op
    handler.uninstall();

    trigger("after uninstall");
    assert_eq!(store.pending_count(), 0);
    assert_eq!(*calls.lock().unwrap(), vec!["after uninstall".to_string()]);

    reset_hook();
}

#[test]
fn test_double_install_does_not_chain_twice() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.install();
    handler.install();
    trigger("once");

    assert_eq!(store.pending_count(), 1);
    assert_eq!(calls.lock().unwrap().len(), 1);

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_storage_failure_still_forwards() {
    let _guard = serialise();
    let calls = install_recording_hook();

    let handler = CrashCaptureHandler::new(Arc::new(BrokenStore), SessionId::new(), options())
        .unwrap();
    handler.install();
    trigger("disk is full");

    assert_eq!(*calls.lock().unwrap(), vec!["disk is full".to_string()]);

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_dropping_handler_restores_previous_hook() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    {
        let handler =
            CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
        handler.install();
    }

    trigger("after drop");
    assert_eq!(store.pending_count(), 0);
    assert_eq!(calls.lock().unwrap().len(), 1);

    reset_hook();
}

// ============================================================================
// Report content and listener
// ============================================================================

#[test]
fn test_captured_report_carries_metadata_and_trace() {
    let _guard = serialise();
    let _calls = install_recording_hook();
    let (_dir, store) = open_store();
    let session = SessionId::new();

    let handler = CrashCaptureHandler::new(store.clone(), session, options()).unwrap();
    let mut metadata = BTreeMap::new();
    metadata.insert("screen".to_string(), Scalar::from("checkout"));
    handler.set_metadata(metadata.clone(), false);
    handler.install();

    trigger("NullPointer");

    let pending = store.list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    let report = &pending[0].report;
    assert_eq!(report.title(), "NullPointer");
    assert_eq!(report.details(), &metadata);
    assert_eq!(report.session_id(), session);
    assert!(!report.is_delivered());
    assert!(report.is_fatal());
    assert!(!report.stack_trace().is_empty());

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_listener_runs_on_callback_thread() {
    let _guard = serialise();
    let _calls = install_recording_hook();
    let (_dir, store) = open_store();

    let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn CrashListener> = Arc::new(move |report: &CrashReport| {
        let thread = std::thread::current().name().map(str::to_string);
        sink.lock().unwrap().push((report.title().to_string(), thread));
    });

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.set_listener(Some(listener));
    handler.install();
    trigger("with listener");

    handler.set_listener(None);
    trigger("without listener");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "with listener");
    assert_eq!(seen[0].1.as_deref(), Some("crashops-callbacks"));
    assert_eq!(store.pending_count(), 2);

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_uninstall_waits_for_in_flight_capture() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let listener: Arc<dyn CrashListener> = Arc::new(move |_report: &CrashReport| {
        let _ = entered_tx.lock().unwrap().send(());
        std::thread::sleep(Duration::from_millis(300));
    });

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.set_listener(Some(listener));
    handler.install();

    let panicking = std::thread::spawn(|| trigger("racing uninstall"));
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("listener never ran");

    let started = Instant::now();
    handler.uninstall();
    let elapsed = started.elapsed();
    panicking.join().unwrap();

    assert!(!handler.is_installed());
    assert!(elapsed < Duration::from_secs(5), "uninstall took {elapsed:?}");
    assert_eq!(store.pending_count(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["racing uninstall".to_string()]);

    trigger("after uninstall");
    assert_eq!(store.pending_count(), 1);
    assert_eq!(calls.lock().unwrap().len(), 2);

    reset_hook();
}

#[test]
fn test_metadata_merge_and_replace() {
    let _guard = serialise();
    let (_dir, store) = open_store();
    let handler = CrashCaptureHandler::new(store, SessionId::new(), options()).unwrap();

    let mut first = BTreeMap::new();
    first.insert("screen".to_string(), Scalar::from("home"));
    handler.set_metadata(first, false);

    let mut second = BTreeMap::new();
    second.insert("user_tier".to_string(), Scalar::from("pro"));
    handler.set_metadata(second.clone(), true);
    assert_eq!(handler.metadata().len(), 2);

    handler.set_metadata(second.clone(), false);
    assert_eq!(handler.metadata(), second);
}

// ============================================================================
// Non-fatal reports
// ============================================================================

#[test]
fn test_log_non_fatal_persists_without_forwarding() {
    let _guard = serialise();
    let calls = install_recording_hook();
    let (_dir, store) = open_store();

    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();
    handler.install();

    let mut details = BTreeMap::new();
    details.insert("attempt".to_string(), Scalar::from(3_i64));
    let id = handler.log_non_fatal("SyncTimeout", details).unwrap();

    let stored = store.get(id).unwrap().unwrap();
    assert_eq!(stored.report.title(), "SyncTimeout");
    assert!(!stored.report.is_fatal());
    assert_eq!(stored.report.details()["attempt"], Scalar::Int(3));
    assert!(!stored.report.stack_trace().is_empty());
    assert!(calls.lock().unwrap().is_empty());

    handler.uninstall();
    reset_hook();
}

#[test]
fn test_log_non_fatal_rejects_empty_title() {
    let _guard = serialise();
    let (_dir, store) = open_store();
    let handler = CrashCaptureHandler::new(store.clone(), SessionId::new(), options()).unwrap();

    assert!(handler.log_non_fatal("  ", BTreeMap::new()).is_err());
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn test_post_callback_runs_on_callback_thread() {
    let (_dir, store) = open_store();
    let handler = CrashCaptureHandler::new(store, SessionId::new(), options()).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    assert!(handler.post_callback(move || {
        let name = std::thread::current().name().map(str::to_string);
        let _ = tx.send(name);
    }));

    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("crashops-callbacks"));
}
