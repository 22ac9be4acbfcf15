//! Domain model for captured failures
//!
//! - [`CrashReport`] - one captured failure, immutable apart from `delivered`
//! - [`StoredReport`] - a report paired with the id the store assigned to it
//! - [`Session`] - one process lifetime
//! - [`Scalar`] - the value type of report details and settings

pub mod errors;
pub mod newtypes;
pub mod report;
pub mod session;
pub mod settings;
pub mod value;

pub use errors::{
    ConfigurationError, DeliveryError, DomainError, RegistrationError, StorageError,
    ValidationError,
};
pub use newtypes::{ReportId, SessionId};
pub use report::{CrashReport, StackFrame, StoredReport};
pub use session::Session;
pub use value::Scalar;
