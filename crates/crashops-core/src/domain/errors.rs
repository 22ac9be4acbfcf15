//! Error taxonomy
//!
//! Each failure domain has its own error type so callers can apply the
//! matching propagation policy:
//! - [`StorageError`] is swallowed (and logged) inside the capture path
//! - [`RegistrationError`] is surfaced by `register_self` as `false`
//! - [`DeliveryError`] keeps one report pending and never aborts a run
//! - [`ConfigurationError`] covers malformed or missing settings

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A crash report must carry a non-empty title
    #[error("Report title must not be empty")]
    EmptyTitle,

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Errors from the persistent report store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the store was doing when the error happened
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored record exists but cannot be read back
    #[error("Corrupted record at {path}: {reason}")]
    Corrupted {
        /// File holding the record
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

impl StorageError {
    /// Wraps an I/O error with a short description of the failed step
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Errors from the host scheduling facility
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The host context has been dropped or never provided a scheduler
    #[error("Host scheduling facility is unavailable")]
    HostUnavailable,

    /// The scheduler refused the job
    #[error("Registration rejected: {0}")]
    Rejected(String),
}

/// Errors from a single delivery attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network or remote failure; the report stays pending for the next run
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// The transport lacks credentials or an endpoint
    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"delivery.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors for malformed or missing configuration and settings
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A value is present but unusable
    #[error("Malformed setting '{key}': {reason}")]
    Malformed {
        /// Setting or config key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A required value is absent
    #[error("Missing setting: {0}")]
    Missing(String),

    /// The configuration file failed validation
    #[error("Invalid configuration: {}", join_validation(.0))]
    Invalid(Vec<ValidationError>),

    /// The configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
