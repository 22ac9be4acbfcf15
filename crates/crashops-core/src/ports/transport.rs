//! Remote transport port (driven/secondary port)
//!
//! Delivery of reports to the remote collector. Outcomes distinguish a
//! delivered report (`Ok`) from a transient failure that leaves the report
//! pending until the next delivery run.

use async_trait::async_trait;

use crate::domain::{CrashReport, DeliveryError};

/// Port trait for the remote collector
#[async_trait]
pub trait IRemoteTransport: Send + Sync {
    /// Announces the current session to the collector
    async fn send_presence(&self, payload: &str) -> Result<(), DeliveryError>;

    /// Delivers one report
    ///
    /// `Ok(())` means the collector accepted it and it may be marked
    /// delivered. Any error keeps the report pending.
    async fn deliver(&self, report: &CrashReport) -> Result<(), DeliveryError>;
}
