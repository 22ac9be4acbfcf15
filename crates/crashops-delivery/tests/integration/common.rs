//! Shared test helpers for delivery integration tests

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crashops_core::domain::{CrashReport, DeliveryError, Scalar, SessionId, StackFrame};
use crashops_core::ports::{IRemoteTransport, IReportStore};
use crashops_store::FileReportStore;

pub fn open_store() -> (TempDir, Arc<FileReportStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileReportStore::open(dir.path()).expect("open store"));
    (dir, store)
}

pub fn sample_report(title: &str) -> CrashReport {
    let mut details = BTreeMap::new();
    details.insert("screen".to_string(), Scalar::from("checkout"));
    CrashReport::new(title, SessionId::new())
        .unwrap()
        .with_details(details)
        .with_stack_trace(vec![StackFrame::new(
            "app::checkout::pay",
            Some("src/checkout.rs".into()),
            Some(42),
        )])
}

/// Transport double that records calls and tracks concurrent deliveries
#[derive(Default)]
pub struct RecordingTransport {
    pub delay: Duration,
    pub failing: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    pub presence: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Appended to the store during the first delivery
    pub append_on_first: Mutex<Option<(Arc<FileReportStore>, CrashReport)>>,
}

impl RecordingTransport {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(titles: &[&str]) -> Self {
        Self {
            failing: titles.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IRemoteTransport for RecordingTransport {
    async fn send_presence(&self, payload: &str) -> Result<(), DeliveryError> {
        self.presence.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn deliver(&self, report: &CrashReport) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(report.title().to_string());

        let extra = self.append_on_first.lock().unwrap().take();
        if let Some((store, late)) = extra {
            store.append(&late).unwrap();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(report.title()) {
            Err(DeliveryError::Transient("503 Service Unavailable".into()))
        } else {
            Ok(())
        }
    }
}
