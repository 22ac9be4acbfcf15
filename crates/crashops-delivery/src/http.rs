//! HTTP transport to the CrashOps collector
//!
//! Reports are POSTed as JSON with the `crashops-client-id` header:
//! fatal reports to `/storeCrashReport`, non-fatal ones to
//! `/storeErrorReport`, presence payloads to `/presence`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crashops_core::config::DeliveryConfig;
//! use crashops_delivery::HttpTransport;
//!
//! # fn example() -> Result<(), crashops_core::domain::DeliveryError> {
//! let transport = HttpTransport::new(&DeliveryConfig::default())?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use crashops_core::config::DeliveryConfig;
use crashops_core::domain::{CrashReport, DeliveryError};
use crashops_core::ports::IRemoteTransport;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

/// Header carrying the client id on every request
pub const CLIENT_ID_HEADER: &str = "crashops-client-id";

const CRASH_PATH: &str = "/storeCrashReport";
const ERROR_PATH: &str = "/storeErrorReport";
const PRESENCE_PATH: &str = "/presence";

/// [`IRemoteTransport`] over HTTPS
pub struct HttpTransport {
    client: Client,
    base_url: String,
    client_id: Option<String>,
}

impl HttpTransport {
    /// Creates a transport from the `delivery` configuration section
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotConfigured`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DeliveryError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
        })
    }

    /// Creates a transport with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>, client_id: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
        }
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, DeliveryError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DeliveryError::NotConfigured("missing client id".to_string()))?;

        Ok(self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(CLIENT_ID_HEADER, client_id))
    }

    async fn send(&self, request: RequestBuilder) -> Result<(), DeliveryError> {
        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Collector rejected request");
            Err(DeliveryError::Transient(format!("HTTP {status}")))
        }
    }
}

#[async_trait]
impl IRemoteTransport for HttpTransport {
    async fn send_presence(&self, payload: &str) -> Result<(), DeliveryError> {
        let request = self
            .post(PRESENCE_PATH)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string());
        self.send(request).await?;
        debug!("Presence sent");
        Ok(())
    }

    async fn deliver(&self, report: &CrashReport) -> Result<(), DeliveryError> {
        let path = if report.is_fatal() { CRASH_PATH } else { ERROR_PATH };
        let request = self.post(path)?.json(report);
        self.send(request).await?;
        debug!(title = report.title(), path, "Report delivered");
        Ok(())
    }
}
