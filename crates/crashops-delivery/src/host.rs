//! Tokio-backed host scheduling facility
//!
//! Reference [`IHostScheduler`] for processes that run a tokio runtime: each
//! job is a task ticking on a `tokio::time::interval`, stopped through its
//! own `CancellationToken`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crashops_core::domain::RegistrationError;
use crashops_core::ports::{IHostScheduler, ScheduledJob};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodic job runner on a tokio runtime
pub struct TokioHostScheduler {
    runtime: Handle,
    jobs: Mutex<HashMap<String, CancellationToken>>,
}

impl TokioHostScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs().contains_key(name)
    }

    /// Cancels every job
    pub fn shutdown(&self) {
        for (name, token) in self.jobs().drain() {
            token.cancel();
            debug!(job = %name, "Periodic job cancelled");
        }
    }
}

impl IHostScheduler for TokioHostScheduler {
    fn schedule_periodic(
        &self,
        name: &str,
        interval: Duration,
        job: ScheduledJob,
    ) -> Result<(), RegistrationError> {
        if interval.is_zero() {
            return Err(RegistrationError::Rejected(format!(
                "job '{name}' needs a non-zero interval"
            )));
        }

        // First run one full interval after registration
        let Some(start) = Instant::now().checked_add(interval) else {
            return Err(RegistrationError::Rejected(format!(
                "job '{name}' interval of {}s is out of range",
                interval.as_secs()
            )));
        };

        let mut jobs = self.jobs();
        if jobs.contains_key(name) {
            debug!(job = %name, "Periodic job already registered, keeping it");
            return Ok(());
        }

        let token = CancellationToken::new();
        let stop = token.clone();
        let job_name = name.to_string();

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!(job = %job_name, "Periodic job tick");
                        job();
                    }
                }
            }
        });

        jobs.insert(name.to_string(), token);
        info!(job = %name, interval_secs = interval.as_secs(), "Periodic job scheduled");
        Ok(())
    }

    fn cancel(&self, name: &str) -> bool {
        match self.jobs().remove(name) {
            Some(token) => {
                token.cancel();
                info!(job = %name, "Periodic job cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioHostScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
