//! Crash report entity
//!
//! A [`CrashReport`] is built once at capture time and never edited
//! afterwards; the only mutation is the one-way `delivered` flag set after a
//! successful delivery.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ReportId, SessionId};
use super::value::Scalar;

/// One frame of a captured stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function or method name, demangled when available
    pub function: String,
    /// Source file, if the frame could be resolved
    pub file: Option<String>,
    /// Line number, if the frame could be resolved
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file: Option<String>, line: Option<u32>) -> Self {
        Self {
            function: function.into(),
            file,
            line,
        }
    }
}

impl Display for StackFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{} ({}:{})", self.function, file, line),
            (Some(file), None) => write!(f, "{} ({})", self.function, file),
            _ => write!(f, "{}", self.function),
        }
    }
}

/// One captured failure
///
/// Fields are private: after construction, title, details, stack trace,
/// timestamp and session are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    title: String,
    #[serde(default)]
    details: BTreeMap<String, Scalar>,
    #[serde(default)]
    stack_trace: Vec<StackFrame>,
    /// Capture instant in milliseconds since the Unix epoch
    timestamp: i64,
    session_id: SessionId,
    #[serde(default)]
    delivered: bool,
    #[serde(default = "default_fatal")]
    fatal: bool,
    #[serde(default)]
    thread: Option<String>,
}

fn default_fatal() -> bool {
    true
}

impl CrashReport {
    /// Creates a fatal report stamped with the current time
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyTitle`] if `title` is blank.
    pub fn new(title: impl Into<String>, session_id: SessionId) -> Result<Self, DomainError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::EmptyTitle);
        }

        Ok(Self {
            title,
            details: BTreeMap::new(),
            stack_trace: Vec::new(),
            timestamp: Utc::now().timestamp_millis(),
            session_id,
            delivered: false,
            fatal: true,
            thread: None,
        })
    }

    pub fn with_details(mut self, details: BTreeMap<String, Scalar>) -> Self {
        self.details = details;
        self
    }

    pub fn with_stack_trace(mut self, frames: Vec<StackFrame>) -> Self {
        self.stack_trace = frames;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = timestamp_ms;
        self
    }

    /// Marks the report as fatal (uncaught) or non-fatal (logged on purpose)
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Records the name of the thread the failure originated on
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn details(&self) -> &BTreeMap<String, Scalar> {
        &self.details
    }

    pub fn stack_trace(&self) -> &[StackFrame] {
        &self.stack_trace
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// One-way transition to delivered. Returns `true` if the flag changed.
    pub fn mark_delivered(&mut self) -> bool {
        let changed = !self.delivered;
        self.delivered = true;
        changed
    }
}

/// A report as held by the store, paired with its assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: ReportId,
    pub report: CrashReport,
}
