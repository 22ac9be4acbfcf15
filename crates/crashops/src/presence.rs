//! Session announcement sent to the collector at startup

use chrono::Utc;
use serde::Serialize;

use crashops_core::domain::Session;
use crashops_core::ports::HostContext;

/// Body of the presence request
#[derive(Debug, Clone, Serialize)]
pub struct PresencePayload {
    pub session_id: String,
    pub app_name: String,
    pub app_version: String,
    pub sdk_version: &'static str,
    pub platform: &'static str,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PresencePayload {
    pub fn new(session: &Session, host: &HostContext) -> Self {
        Self {
            session_id: session.id().to_string(),
            app_name: host.app_name().to_string(),
            app_version: host.app_version().to_string(),
            sdk_version: env!("CARGO_PKG_VERSION"),
            platform: std::env::consts::OS,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain strings and integers always serialize
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
