//! The CrashOps context and its builder

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crashops_capture::{CaptureError, CaptureOptions, CrashCaptureHandler, CrashListener};
use crashops_core::config::Config;
use crashops_core::domain::{
    settings, ConfigurationError, DeliveryError, ReportId, Scalar, Session, StorageError,
    StoredReport,
};
use crashops_core::ports::{HostContext, IHostScheduler, IRemoteTransport, IReportStore};
use crashops_delivery::{
    DeliveryObserver, DeliveryScheduler, FanInSynchronizer, HttpTransport, RunOutcome,
    TokioHostScheduler,
};
use crashops_store::FileReportStore;

use crate::presence::PresencePayload;
use crate::previous::{PreviousReports, PreviousReportsListener};

/// Errors surfaced by the [`CrashOps`] context
#[derive(Debug, Error)]
pub enum CrashOpsError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Readiness signals joined before the first delivery run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    SettingsLoaded,
    PresenceSent(bool),
}

/// Configures and starts a [`CrashOps`] context
pub struct CrashOpsBuilder {
    config: Config,
    app_name: String,
    app_version: String,
    store: Option<Arc<dyn IReportStore>>,
    transport: Option<Arc<dyn IRemoteTransport>>,
    host: Option<HostContext>,
    deliver_on_start: bool,
}

impl CrashOpsBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            app_name: "unknown".to_string(),
            app_version: "0.0.0".to_string(),
            store: None,
            transport: None,
            host: None,
            deliver_on_start: true,
        }
    }

    /// Name and version of the embedding application
    ///
    /// Ignored when an explicit [`host`](Self::host) is given.
    pub fn app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = name.into();
        self.app_version = version.into();
        self
    }

    /// Uses `store` instead of opening a [`FileReportStore`] at the
    /// configured data directory
    pub fn store(mut self, store: Arc<dyn IReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `transport` instead of an [`HttpTransport`] built from the
    /// `delivery` section
    pub fn transport(mut self, transport: Arc<dyn IRemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers delivery with the host's own scheduling facility
    ///
    /// Without this, the context runs its own [`TokioHostScheduler`].
    pub fn host(mut self, host: HostContext) -> Self {
        self.host = Some(host);
        self
    }

    /// Whether to deliver pending reports once startup readiness settles
    pub fn deliver_on_start(mut self, deliver: bool) -> Self {
        self.deliver_on_start = deliver;
        self
    }

    /// Opens the store, installs the crash handler and registers delivery
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unopenable store, or when the
    /// capture workers or the HTTP client cannot be created. A host that
    /// refuses the delivery job is not an error.
    pub fn start(self, runtime: Handle) -> Result<CrashOps, CrashOpsError> {
        let errors = self.config.validate();
        if !errors.is_empty() {
            return Err(ConfigurationError::Invalid(errors).into());
        }

        let store: Arc<dyn IReportStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileReportStore::open(&self.config.storage.data_dir)?),
        };
        let transport: Arc<dyn IRemoteTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.delivery)?),
        };

        let (host, owned_scheduler) = match self.host {
            Some(host) => (host, None),
            None => {
                let scheduler: Arc<dyn IHostScheduler> =
                    Arc::new(TokioHostScheduler::new(runtime.clone()));
                let host = HostContext::new(self.app_name, self.app_version, &scheduler);
                (host, Some(scheduler))
            }
        };

        let session = Session::start();
        let handler = Arc::new(CrashCaptureHandler::new(
            Arc::clone(&store),
            session.id(),
            CaptureOptions::from(&self.config.capture),
        )?);

        let enabled = store.get_bool(settings::ENABLED, self.config.capture.enabled);
        if enabled {
            handler.install();
        }

        let delivery = DeliveryScheduler::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            runtime.clone(),
            self.config.delivery.interval(),
            self.config.capture.enabled,
        );
        let previous = Arc::new(PreviousReports::new(
            session.id(),
            Arc::clone(&store),
            self.config.capture.enabled,
        ));
        let observer: DeliveryObserver = {
            let previous = Arc::clone(&previous);
            let handler = Arc::downgrade(&handler);
            Arc::new(move |delivered: Vec<StoredReport>| {
                if let Some(handler) = handler.upgrade() {
                    previous.on_delivered(delivered, &handler);
                }
            })
        };
        delivery.set_delivery_observer(Some(observer));
        delivery.register_self(&host);

        let readiness = {
            let scheduler = delivery.clone();
            let ctx = host.clone();
            let deliver_on_start = self.deliver_on_start;
            FanInSynchronizer::with_debounce(
                runtime.clone(),
                self.config.delivery.readiness_debounce(),
                move |signals: Vec<Option<Readiness>>| {
                    debug!(signals = ?signals, "Startup readiness settled");
                    if deliver_on_start {
                        scheduler.run_if_idle(&ctx, |outcome| {
                            debug!(outcome = ?outcome, "Startup delivery run finished");
                        });
                    }
                },
            )
        };

        let settings_loaded = readiness.create_holder();
        let presence_sent = readiness.create_holder();

        if enabled {
            let payload = PresencePayload::new(&session, &host).to_json();
            let transport = Arc::clone(&transport);
            runtime.spawn(async move {
                let sent = match transport.send_presence(&payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(error = %e, "Presence not sent");
                        false
                    }
                };
                presence_sent.release(Some(Readiness::PresenceSent(sent)));
            });
        } else {
            presence_sent.release(Some(Readiness::PresenceSent(false)));
        }
        settings_loaded.release(Some(Readiness::SettingsLoaded));

        info!(
            session_id = %session.id(),
            app = host.app_name(),
            enabled,
            "CrashOps started"
        );

        Ok(CrashOps {
            config: self.config,
            session,
            store,
            handler,
            delivery,
            previous,
            host,
            readiness,
            _owned_scheduler: owned_scheduler,
        })
    }
}

/// Process-lifetime CrashOps context
///
/// Dropping the context uninstalls the crash handler and removes the
/// delivery job from the host.
pub struct CrashOps {
    config: Config,
    session: Session,
    store: Arc<dyn IReportStore>,
    handler: Arc<CrashCaptureHandler>,
    delivery: DeliveryScheduler,
    previous: Arc<PreviousReports>,
    host: HostContext,
    readiness: FanInSynchronizer<Readiness>,
    _owned_scheduler: Option<Arc<dyn IHostScheduler>>,
}

impl CrashOps {
    pub fn builder(config: Config) -> CrashOpsBuilder {
        CrashOpsBuilder::new(config)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn IReportStore> {
        &self.store
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Whether crashes are currently captured
    pub fn is_enabled(&self) -> bool {
        self.store
            .get_bool(settings::ENABLED, self.config.capture.enabled)
    }

    /// Persists the enabled toggle and installs the crash handler
    pub fn enable(&self) -> Result<(), CrashOpsError> {
        self.store
            .set_setting(settings::ENABLED, Scalar::Bool(true), true)?;
        self.handler.install();
        Ok(())
    }

    /// Persists the disabled toggle and restores the previous panic hook
    pub fn disable(&self) -> Result<(), CrashOpsError> {
        self.store
            .set_setting(settings::ENABLED, Scalar::Bool(false), true)?;
        self.handler.uninstall();
        Ok(())
    }

    /// Sets the details attached to every future crash report
    pub fn set_metadata(&self, metadata: BTreeMap<String, Scalar>, merge: bool) {
        self.handler.set_metadata(metadata, merge);
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn CrashListener>>) {
        self.handler.set_listener(listener);
    }

    /// Sets the listener told about reports an earlier run left behind
    ///
    /// It fires at most once per process, on the `crashops-callbacks`
    /// thread, after the first delivery run that sent such reports. Setting
    /// it after that run has no effect until the next process start.
    pub fn set_previous_reports_listener(
        &self,
        listener: Option<Arc<dyn PreviousReportsListener>>,
    ) {
        self.previous.set_listener(listener);
    }

    /// Stores the application key used to identify this app to the collector
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Malformed`] for an empty key or one
    /// longer than [`settings::MAX_APP_KEY_LEN`] characters.
    pub fn set_app_key(&self, key: &str) -> Result<(), CrashOpsError> {
        let key = key.trim();
        if key.is_empty() || key.chars().count() > settings::MAX_APP_KEY_LEN {
            return Err(ConfigurationError::Malformed {
                key: settings::APP_KEY.to_string(),
                reason: format!("must be 1 to {} characters", settings::MAX_APP_KEY_LEN),
            }
            .into());
        }
        self.store
            .set_setting(settings::APP_KEY, Scalar::from(key), true)?;
        info!("Application key updated");
        Ok(())
    }

    pub fn app_key(&self) -> Option<String> {
        self.store
            .get_setting(settings::APP_KEY, Scalar::Text(String::new()))
            .as_str()
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Reads a runtime setting, falling back to its configured default
    pub fn setting(&self, key: &str) -> Option<Scalar> {
        let default = self.config.setting_defaults().remove(key)?;
        Some(self.store.get_setting(key, default))
    }

    pub fn set_setting(
        &self,
        key: &str,
        value: Scalar,
        persist: bool,
    ) -> Result<(), CrashOpsError> {
        self.store.set_setting(key, value, persist)?;
        Ok(())
    }

    /// Records a non-fatal report and asks for delivery
    ///
    /// Returns `None` without recording anything while disabled.
    #[track_caller]
    pub fn log_non_fatal(
        &self,
        title: &str,
        details: BTreeMap<String, Scalar>,
    ) -> Result<Option<ReportId>, CrashOpsError> {
        if !self.is_enabled() {
            debug!(title, "CrashOps disabled, non-fatal report dropped");
            return Ok(None);
        }

        let id = self.handler.log_non_fatal(title, details)?;
        self.delivery.run_if_idle(&self.host, |outcome| {
            debug!(outcome = ?outcome, "Delivery after non-fatal report finished");
        });
        Ok(Some(id))
    }

    /// Reports still waiting for delivery, oldest first
    pub fn pending_reports(&self) -> Result<Vec<StoredReport>, CrashOpsError> {
        Ok(self.store.list_pending()?)
    }

    /// Deletes every stored report and setting override
    pub fn clear_history(&self) -> bool {
        let cleared = self.store.clear_all();
        if !cleared {
            warn!("Report history only partially cleared");
        }
        cleared
    }

    /// Delivers pending reports now and waits for the outcome
    pub async fn deliver_now(&self) -> RunOutcome {
        self.delivery.run_now().await
    }

    /// Uninstalls the crash handler and removes the delivery job
    pub fn shutdown(&self) {
        self.readiness.cancel();
        self.delivery.set_delivery_observer(None);
        self.handler.uninstall();
        if self.delivery.unregister(&self.host) {
            debug!("Delivery worker unregistered");
        }
    }
}

impl Drop for CrashOps {
    fn drop(&mut self) {
        self.shutdown();
    }
}
