//! Configuration module for CrashOps.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! The configuration is also the settings source: it supplies the default value
//! of every runtime toggle read through the report store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{ConfigurationError, ValidationError};
use crate::domain::settings;
use crate::domain::Scalar;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for CrashOps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

/// Where reports and setting overrides live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the report store.
    pub data_dir: PathBuf,
}

/// Failure capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Default for the `crashops.enabled` toggle.
    pub enabled: bool,
    /// Default for the `crashops.collect_traces` toggle.
    pub collect_traces: bool,
    /// Longest time a failing thread waits for its report to be persisted.
    pub persist_timeout_ms: u64,
    /// Longest time a failing thread waits for the crash listener.
    pub listener_timeout_ms: u64,
}

/// Delivery to the remote collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Collector base URL.
    pub endpoint: String,
    /// Client id sent with every request. `None` disables delivery.
    pub client_id: Option<String>,
    /// Default for the `crashops.delivery_interval_secs` setting.
    pub interval_secs: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Trailing-edge delay used when joining startup readiness signals.
    pub readiness_debounce_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Load(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigurationError::Load(format!("{}: {e}", path.display())))
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Load and validate in one step.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigurationError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigurationError::Invalid(errors))
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/crashops/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("crashops")
            .join("config.yaml")
    }

    /// Default values of the runtime settings, keyed by setting name.
    pub fn setting_defaults(&self) -> HashMap<&'static str, Scalar> {
        HashMap::from([
            (settings::ENABLED, Scalar::Bool(self.capture.enabled)),
            (
                settings::COLLECT_TRACES,
                Scalar::Bool(self.capture.collect_traces),
            ),
            (
                settings::DELIVERY_INTERVAL_SECS,
                Scalar::Int(i64::try_from(self.delivery.interval_secs).unwrap_or(i64::MAX)),
            ),
        ])
    }
}

impl CaptureConfig {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn listener_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_timeout_ms)
    }
}

impl DeliveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn readiness_debounce(&self) -> Duration {
        Duration::from_millis(self.readiness_debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("crashops"),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collect_traces: true,
            persist_timeout_ms: 2_000,
            listener_timeout_ms: 1_000,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://us-central1-crash-logs.cloudfunctions.net".to_string(),
            client_id: None,
            interval_secs: 2 * 60 * 60,
            request_timeout_secs: 30,
            readiness_debounce_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.data_dir".into(),
                message: "must not be empty".into(),
            });
        }

        // --- capture ---
        if self.capture.persist_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "capture.persist_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.capture.listener_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "capture.listener_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- delivery ---
        if !(self.delivery.endpoint.starts_with("http://")
            || self.delivery.endpoint.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "delivery.endpoint".into(),
                message: format!(
                    "must be an http(s) URL, got '{}'",
                    self.delivery.endpoint
                ),
            });
        }
        if let Some(client_id) = &self.delivery.client_id {
            if client_id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "delivery.client_id".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }
        if self.delivery.interval_secs == 0 {
            errors.push(ValidationError {
                field: "delivery.interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.delivery.interval_secs > settings::MAX_DELIVERY_INTERVAL_SECS {
            errors.push(ValidationError {
                field: "delivery.interval_secs".into(),
                message: format!(
                    "must be at most {} (30 days)",
                    settings::MAX_DELIVERY_INTERVAL_SECS
                ),
            });
        }
        if self.delivery.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "delivery.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use crashops_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .data_dir(PathBuf::from("/tmp/crashops"))
///     .delivery_interval_secs(600)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    // --- capture ---

    pub fn capture_enabled(mut self, enabled: bool) -> Self {
        self.config.capture.enabled = enabled;
        self
    }

    pub fn collect_traces(mut self, collect: bool) -> Self {
        self.config.capture.collect_traces = collect;
        self
    }

    pub fn persist_timeout_ms(mut self, ms: u64) -> Self {
        self.config.capture.persist_timeout_ms = ms;
        self
    }

    pub fn listener_timeout_ms(mut self, ms: u64) -> Self {
        self.config.capture.listener_timeout_ms = ms;
        self
    }

    // --- delivery ---

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.delivery.endpoint = endpoint.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.delivery.client_id = Some(client_id.into());
        self
    }

    pub fn delivery_interval_secs(mut self, seconds: u64) -> Self {
        self.config.delivery.interval_secs = seconds;
        self
    }

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.delivery.request_timeout_secs = seconds;
        self
    }

    pub fn readiness_debounce_ms(mut self, ms: u64) -> Self {
        self.config.delivery.readiness_debounce_ms = ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the final [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
