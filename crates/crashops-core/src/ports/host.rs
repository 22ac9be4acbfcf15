//! Host process context and scheduling facility
//!
//! The host owns its lifecycle object; CrashOps only keeps a [`HostContext`]
//! whose scheduler reference is weak and resolved on each use.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::domain::RegistrationError;

/// A job the host scheduler invokes on every tick
pub type ScheduledJob = Arc<dyn Fn() + Send + Sync>;

/// Port trait for the host's periodic scheduling facility
pub trait IHostScheduler: Send + Sync {
    /// Registers `job` to run every `interval` under `name`
    ///
    /// If a job with the same name is already registered, the existing
    /// registration is kept and `Ok(())` is returned.
    fn schedule_periodic(
        &self,
        name: &str,
        interval: Duration,
        job: ScheduledJob,
    ) -> Result<(), RegistrationError>;

    /// Cancels the job registered under `name`. Returns `true` if one existed.
    fn cancel(&self, name: &str) -> bool;
}

/// Non-owning handle to the host process
#[derive(Clone)]
pub struct HostContext {
    app_name: String,
    app_version: String,
    scheduler: Weak<dyn IHostScheduler>,
}

impl HostContext {
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        scheduler: &Arc<dyn IHostScheduler>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            scheduler: Arc::downgrade(scheduler),
        }
    }

    /// A context with no scheduling facility; registration always fails
    pub fn detached(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            scheduler: Weak::<Detached>::new(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// Resolves the scheduler, if the host still holds it
    pub fn scheduler(&self) -> Result<Arc<dyn IHostScheduler>, RegistrationError> {
        self.scheduler
            .upgrade()
            .ok_or(RegistrationError::HostUnavailable)
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("app_name", &self.app_name)
            .field("app_version", &self.app_version)
            .field("scheduler_alive", &(self.scheduler.strong_count() > 0))
            .finish()
    }
}

/// Placeholder type used only to build an empty `Weak<dyn IHostScheduler>`
struct Detached;

impl IHostScheduler for Detached {
    fn schedule_periodic(
        &self,
        _name: &str,
        _interval: Duration,
        _job: ScheduledJob,
    ) -> Result<(), RegistrationError> {
        Err(RegistrationError::HostUnavailable)
    }

    fn cancel(&self, _name: &str) -> bool {
        false
    }
}
