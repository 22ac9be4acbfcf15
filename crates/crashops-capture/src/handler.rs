//! Process-wide panic capture
//!
//! [`CrashCaptureHandler`] is a two-slot chain: while installed, the active
//! panic hook is ours and the hook that was active before is kept as
//! `previous`. Every panic is captured best-effort and then forwarded to
//! `previous` unconditionally.
//!
//! ## Locking
//!
//! One mutex guards the installed flag, the previous hook, the listener and
//! the metadata. Install, uninstall, and each capture hold it for their
//! whole duration, so a capture can never observe a half-swapped chain.
//!
//! The standard library holds its own hook lock while a hook runs, and
//! `take_hook` / `set_hook` wait for it. A capture therefore only *tries* to
//! take our mutex for a bounded time; if an uninstall holds it, the capture
//! is abandoned and the panic is forwarded, which lets the uninstall finish.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::panic::{self, Location, PanicHookInfo};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crashops_core::config::CaptureConfig;
use crashops_core::domain::{
    settings, CrashReport, ReportId, Scalar, SessionId, StackFrame, StorageError,
};
use crashops_core::ports::IReportStore;
use tracing::{debug, error, info, warn};

use crate::frames::{frames_from_backtrace, location_frame};
use crate::listener::CrashListener;
use crate::worker::BackgroundWorker;
use crate::CaptureError;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Name of the worker running symbol resolution and store writes
pub const IO_WORKER: &str = "crashops-io";
/// Name of the worker running the crash listener
pub const CALLBACK_WORKER: &str = "crashops-callbacks";

/// Longest title kept from a panic message
const MAX_TITLE_CHARS: usize = 120;

thread_local! {
    /// Set while this thread is inside a capture; a nested panic is only
    /// forwarded
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

/// Timeouts and defaults for the capture path
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Longest wait for the report to be handed to the store
    pub persist_timeout: Duration,
    /// Longest wait for the listener to return
    pub listener_timeout: Duration,
    /// Default of the `crashops.collect_traces` setting
    pub collect_traces: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            persist_timeout: config.persist_timeout(),
            listener_timeout: config.listener_timeout(),
            collect_traces: config.collect_traces,
        }
    }
}

#[derive(Default)]
struct HandlerState {
    installed: bool,
    previous: Option<Arc<PanicHook>>,
    listener: Option<Arc<dyn CrashListener>>,
    metadata: BTreeMap<String, Scalar>,
}

struct Shared {
    store: Arc<dyn IReportStore>,
    session_id: SessionId,
    options: CaptureOptions,
    io: BackgroundWorker,
    callbacks: BackgroundWorker,
    state: Mutex<HandlerState>,
}

/// Captures uncaught panics into the report store
pub struct CrashCaptureHandler {
    shared: Arc<Shared>,
}

impl CrashCaptureHandler {
    /// Creates an uninstalled handler and starts its two worker threads
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Worker`] if a worker thread cannot be spawned.
    pub fn new(
        store: Arc<dyn IReportStore>,
        session_id: SessionId,
        options: CaptureOptions,
    ) -> Result<Self, CaptureError> {
        let io = BackgroundWorker::spawn(IO_WORKER).map_err(CaptureError::Worker)?;
        let callbacks = BackgroundWorker::spawn(CALLBACK_WORKER).map_err(CaptureError::Worker)?;

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                session_id,
                options,
                io,
                callbacks,
                state: Mutex::new(HandlerState::default()),
            }),
        })
    }

    /// Registers the handler as the process panic hook
    ///
    /// The hook active before this call becomes `previous`. Does nothing if
    /// already installed, or when called from a panicking thread.
    pub fn install(&self) {
        let mut state = self.shared.lock();
        if state.installed {
            return;
        }
        if thread::panicking() {
            warn!("Cannot install crash handler while panicking");
            return;
        }

        let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
        let forward = Arc::clone(&previous);
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        panic::set_hook(Box::new(move |info| {
            if let Some(shared) = shared.upgrade() {
                shared.on_panic(info);
            }
            forward(info);
        }));

        state.previous = Some(previous);
        state.installed = true;
        info!(session_id = %self.shared.session_id, "Crash handler installed");
    }

    /// Restores the hook captured by [`install`](Self::install)
    ///
    /// Does nothing if not installed. Assumes no other hook was layered on
    /// top of ours since installation.
    pub fn uninstall(&self) {
        let mut state = self.shared.lock();
        if !state.installed {
            return;
        }
        if thread::panicking() {
            warn!("Cannot uninstall crash handler while panicking");
            return;
        }

        state.installed = false;
        // Dropping our hook releases its clone of `previous`
        drop(panic::take_hook());

        if let Some(previous) = state.previous.take() {
            match Arc::try_unwrap(previous) {
                Ok(hook) => panic::set_hook(hook),
                Err(shared) => panic::set_hook(Box::new(move |info| shared(info))),
            }
        }
        info!("Crash handler uninstalled");
    }

    pub fn is_installed(&self) -> bool {
        self.shared.lock().installed
    }

    /// Replaces the crash listener; `None` clears it
    pub fn set_listener(&self, listener: Option<Arc<dyn CrashListener>>) {
        self.shared.lock().listener = listener;
    }

    /// Sets the details attached to every captured report
    ///
    /// With `merge`, entries are added over the current metadata; otherwise
    /// the metadata is replaced.
    pub fn set_metadata(&self, metadata: BTreeMap<String, Scalar>, merge: bool) {
        let mut state = self.shared.lock();
        if merge {
            state.metadata.extend(metadata);
        } else {
            state.metadata = metadata;
        }
    }

    pub fn metadata(&self) -> BTreeMap<String, Scalar> {
        self.shared.lock().metadata.clone()
    }

    /// Queues `job` on the callback worker, the thread crash listeners run on
    ///
    /// Returns `false` once the handler's workers have stopped.
    pub fn post_callback<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.callbacks.execute(job)
    }

    /// Records a non-fatal report through the capture path
    ///
    /// `details` are layered over the handler metadata. The listener is not
    /// called and nothing is forwarded.
    ///
    /// # Errors
    ///
    /// Fails on an empty title, a storage error, or when the store write
    /// does not finish within the persist timeout.
    #[track_caller]
    pub fn log_non_fatal(
        &self,
        title: &str,
        details: BTreeMap<String, Scalar>,
    ) -> Result<ReportId, CaptureError> {
        let fallback = location_frame(Some(Location::caller()));
        let state = self.shared.lock();

        let mut merged = state.metadata.clone();
        merged.extend(details);

        let report = CrashReport::new(title, self.shared.session_id)?
            .with_details(merged)
            .with_fatal(false)
            .with_thread(current_thread_name());

        let (_, result) = self
            .shared
            .persist(report, self.shared.collect_backtrace(), fallback)
            .ok_or(CaptureError::Timeout(IO_WORKER))?;
        let id = result?;

        debug!(report_id = %id, title, "Non-fatal report logged");
        Ok(id)
    }
}

impl Drop for CrashCaptureHandler {
    fn drop(&mut self) {
        self.uninstall();
        self.shared.io.stop();
        self.shared.callbacks.stop();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, HandlerState>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    fn collect_backtrace(&self) -> Option<Backtrace> {
        let collect = self
            .store
            .get_bool(settings::COLLECT_TRACES, self.options.collect_traces);
        collect.then(Backtrace::force_capture)
    }

    /// Resolves the trace and appends the report on the io worker
    ///
    /// Returns `None` if the worker did not finish in time.
    fn persist(
        &self,
        report: CrashReport,
        backtrace: Option<Backtrace>,
        fallback: StackFrame,
    ) -> Option<(CrashReport, Result<ReportId, StorageError>)> {
        let store = Arc::clone(&self.store);
        self.io.run_and_wait(self.options.persist_timeout, move || {
            let frames = match &backtrace {
                Some(bt) => frames_from_backtrace(bt, fallback),
                None => vec![fallback],
            };
            let report = report.with_stack_trace(frames);
            let result = store.append(&report);
            (report, result)
        })
    }

    /// Hook body: best-effort capture, never panics, never blocks unbounded
    fn on_panic(&self, info: &PanicHookInfo<'_>) {
        if IN_CAPTURE.with(Cell::get) {
            return;
        }
        // Failures on our own workers come from the capture path itself
        if self.io.is_current() || self.callbacks.is_current() {
            return;
        }

        IN_CAPTURE.with(|flag| flag.set(true));
        self.capture(info);
        IN_CAPTURE.with(|flag| flag.set(false));
    }

    fn capture(&self, info: &PanicHookInfo<'_>) {
        let Some(state) = self.try_lock_for(self.options.persist_timeout) else {
            warn!("Crash handler busy; forwarding panic without capture");
            return;
        };
        if !state.installed {
            return;
        }

        let backtrace = self.collect_backtrace();
        let title = panic_title(info);
        let report = match CrashReport::new(title, self.session_id) {
            Ok(report) => report
                .with_details(state.metadata.clone())
                .with_thread(current_thread_name()),
            Err(e) => {
                error!(error = %e, "Failed to build crash report");
                return;
            }
        };

        let fallback = location_frame(info.location());
        let Some((report, result)) = self.persist(report, backtrace, fallback) else {
            error!("Crash report was not persisted in time");
            return;
        };
        match result {
            Ok(id) => info!(report_id = %id, title = report.title(), "Crash captured"),
            Err(e) => error!(error = %e, "Failed to persist crash report"),
        }

        if let Some(listener) = state.listener.clone() {
            let notified = self
                .callbacks
                .run_and_wait(self.options.listener_timeout, move || {
                    listener.on_crash(&report)
                });
            if notified.is_none() {
                warn!("Crash listener did not return in time");
            }
        }
    }
}

fn panic_title(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .and_then(|msg| msg.lines().next())
        .map(str::trim)
        .filter(|line| !line.is_empty());

    match message {
        Some(line) => line.chars().take(MAX_TITLE_CHARS).collect(),
        None => "panic".to_string(),
    }
}

fn current_thread_name() -> String {
    thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}
