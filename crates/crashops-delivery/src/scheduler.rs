//! Delivery scheduler - forwards pending reports to the collector
//!
//! The [`DeliveryScheduler`] registers itself with the host's periodic
//! scheduling facility and, on every tick or explicit request, delivers all
//! pending reports oldest-first through the [`IRemoteTransport`].
//!
//! ## Single-flight
//!
//! ```text
//!  run_if_idle ──CAS(false→true)──→ Running ──→ Idle ──→ on_complete(outcome)
//!       │
//!       └── already running / disabled ──→ on_complete(Skipped)
//! ```
//!
//! A request that arrives while a run is in flight is a no-op: the next
//! scheduled tick picks up whatever is still pending.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use crashops_core::domain::{settings, ReportId, Scalar, StorageError, StoredReport};
use crashops_core::ports::{HostContext, IRemoteTransport, IReportStore, ScheduledJob};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Name under which the delivery job is registered with the host
pub const JOB_NAME: &str = "crashops-delivery";

/// Upper bound on re-reads of the pending list within one run
const MAX_PASSES: usize = 8;

/// Called with the reports a run delivered, after every run that delivered
/// at least one. Runs on a runtime worker and must not block.
pub type DeliveryObserver = Arc<dyn Fn(Vec<StoredReport>) + Send + Sync>;

/// Aggregate result of one delivery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pending report was delivered
    Success { delivered: usize },
    /// Some reports are still pending after the run
    Failure {
        delivered: usize,
        remaining: usize,
        error: String,
    },
    /// Not started: another run was in progress or delivery is disabled
    Skipped,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

struct SchedulerInner {
    store: Arc<dyn IReportStore>,
    transport: Arc<dyn IRemoteTransport>,
    runtime: Handle,
    running: AtomicBool,
    default_interval: Duration,
    enabled_by_default: bool,
    observer: Mutex<Option<DeliveryObserver>>,
}

/// Idle-triggered worker delivering pending reports
///
/// Cheap to clone; clones share the same single-flight state.
#[derive(Clone)]
pub struct DeliveryScheduler {
    inner: Arc<SchedulerInner>,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeliveryScheduler {
    /// Creates an idle scheduler
    ///
    /// # Arguments
    /// * `runtime` - Background context on which runs execute
    /// * `default_interval` - Used when `crashops.delivery_interval_secs` is unset
    /// * `enabled_by_default` - Used when `crashops.enabled` is unset
    pub fn new(
        store: Arc<dyn IReportStore>,
        transport: Arc<dyn IRemoteTransport>,
        runtime: Handle,
        default_interval: Duration,
        enabled_by_default: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                transport,
                runtime,
                running: AtomicBool::new(false),
                default_interval,
                enabled_by_default,
                observer: Mutex::new(None),
            }),
        }
    }

    /// Registers the periodic delivery job with the host
    ///
    /// Returns `false` if the host is gone or rejects the job. Capture keeps
    /// working either way; only delivery is deferred.
    pub fn register_self(&self, host: &HostContext) -> bool {
        let scheduler = match host.scheduler() {
            Ok(scheduler) => scheduler,
            Err(e) => {
                warn!(error = %e, "Delivery worker not registered");
                return false;
            }
        };

        let interval = self.interval();
        let this = self.clone();
        let ctx = host.clone();
        let job: ScheduledJob = Arc::new(move || {
            this.run_if_idle(&ctx, |outcome| {
                debug!(outcome = ?outcome, "Scheduled delivery run finished");
            });
        });

        match scheduler.schedule_periodic(JOB_NAME, interval, job) {
            Ok(()) => {
                info!(
                    app = host.app_name(),
                    interval_secs = interval.as_secs(),
                    "Delivery worker registered"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Delivery worker registration rejected");
                false
            }
        }
    }

    /// Removes the periodic job from the host, if it is still there
    pub fn unregister(&self, host: &HostContext) -> bool {
        host.scheduler()
            .map(|scheduler| scheduler.cancel(JOB_NAME))
            .unwrap_or(false)
    }

    /// Starts a run in the background unless one is already in progress
    ///
    /// `on_complete` is invoked exactly once: with the run's outcome, or with
    /// [`RunOutcome::Skipped`] immediately if no run was started. Returns
    /// whether a run was started.
    pub fn run_if_idle<F>(&self, host: &HostContext, on_complete: F) -> bool
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        if !self.is_enabled() {
            debug!("Delivery disabled, skipping run");
            on_complete(RunOutcome::Skipped);
            return false;
        }
        if !self.try_begin() {
            debug!("Delivery run already in progress, skipping");
            on_complete(RunOutcome::Skipped);
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let app = host.app_name().to_string();
        self.inner.runtime.spawn(async move {
            let _guard = RunGuard(&inner.running);
            info!(app = %app, "Delivery run started");
            let outcome = inner.execute().await;
            drop(_guard);
            on_complete(outcome);
        });
        true
    }

    /// Runs a delivery pass on the current task and waits for it
    ///
    /// Same single-flight and enablement rules as
    /// [`run_if_idle`](Self::run_if_idle).
    pub async fn run_now(&self) -> RunOutcome {
        if !self.is_enabled() || !self.try_begin() {
            return RunOutcome::Skipped;
        }
        let _guard = RunGuard(&self.inner.running);
        self.inner.execute().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Delivery interval: the stored setting if within
    /// `1..=MAX_DELIVERY_INTERVAL_SECS`, else the default
    pub fn interval(&self) -> Duration {
        let default_secs = i64::try_from(self.inner.default_interval.as_secs()).unwrap_or(i64::MAX);
        self.inner
            .store
            .get_setting(settings::DELIVERY_INTERVAL_SECS, Scalar::Int(default_secs))
            .as_i64()
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| (1..=settings::MAX_DELIVERY_INTERVAL_SECS).contains(secs))
            .map_or(self.inner.default_interval, Duration::from_secs)
    }

    fn is_enabled(&self) -> bool {
        self.inner
            .store
            .get_bool(settings::ENABLED, self.inner.enabled_by_default)
    }

    /// Replaces the delivery observer; `None` clears it
    pub fn set_delivery_observer(&self, observer: Option<DeliveryObserver>) {
        *self.inner.observer() = observer;
    }

    fn try_begin(&self) -> bool {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl SchedulerInner {
    fn observer(&self) -> MutexGuard<'_, Option<DeliveryObserver>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a blocking store operation off the async workers
    async fn with_store<R, F>(&self, op: F) -> Result<R, StorageError>
    where
        F: FnOnce(&dyn IReportStore) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.runtime
            .spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| {
                StorageError::io("running store task", std::io::Error::other(e.to_string()))
            })?
    }

    /// One delivery run; assumes the running flag is held
    async fn execute(&self) -> RunOutcome {
        let mut delivered = 0usize;
        let mut sent: Vec<StoredReport> = Vec::new();
        let mut failed: HashSet<ReportId> = HashSet::new();
        let mut last_error: Option<String> = None;

        for pass in 0..MAX_PASSES {
            let pending = match self.with_store(|store| store.list_pending()).await {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(error = %e, "Cannot read pending reports");
                    return RunOutcome::Failure {
                        delivered,
                        remaining: self.store.pending_count(),
                        error: e.to_string(),
                    };
                }
            };

            let batch: Vec<_> = pending
                .into_iter()
                .filter(|stored| !failed.contains(&stored.id))
                .collect();
            if batch.is_empty() {
                break;
            }
            debug!(pass, reports = batch.len(), "Delivering pending reports");

            for stored in batch {
                let id = stored.id;
                if let Err(e) = self.transport.deliver(&stored.report).await {
                    warn!(report_id = %id, error = %e, "Delivery failed, report stays pending");
                    failed.insert(id);
                    last_error = Some(e.to_string());
                    continue;
                }

                match self.with_store(move |store| store.mark_delivered(id)).await {
                    Ok(true) => {
                        delivered += 1;
                        sent.push(stored);
                    }
                    Ok(false) => debug!(report_id = %id, "Delivered report no longer stored"),
                    Err(e) => {
                        warn!(report_id = %id, error = %e, "Cannot mark report delivered");
                        failed.insert(id);
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        let stamp = Scalar::Int(Utc::now().timestamp_millis());
        if let Err(e) = self
            .with_store(move |store| store.set_setting(settings::LAST_DELIVERY_AT, stamp, true))
            .await
        {
            warn!(error = %e, "Cannot record delivery time");
        }

        if !sent.is_empty() {
            let observer = self.observer().clone();
            if let Some(observer) = observer {
                observer(sent);
            }
        }

        let remaining = self.store.pending_count();
        if remaining == 0 && failed.is_empty() {
            info!(delivered, "Delivery run succeeded");
            RunOutcome::Success { delivered }
        } else {
            info!(delivered, remaining, "Delivery run finished with pending reports");
            RunOutcome::Failure {
                delivered,
                remaining,
                error: last_error.unwrap_or_else(|| "reports remain pending".to_string()),
            }
        }
    }
}
