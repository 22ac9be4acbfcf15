//! Terminal output for the `crashops` CLI
//!
//! Every command prints through a [`Printer`]. In human mode status lines
//! carry a marker and notes are indented; in JSON mode each status line is
//! one compact object and notes are suppressed so stdout stays parseable.

use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Kind of a printed status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Failure,
    Warning,
    Note,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Success => "ok",
            Status::Failure => "error",
            Status::Warning => "warning",
            Status::Note => "note",
        }
    }

    /// Failures and warnings go to stderr
    fn goes_to_stderr(self) -> bool {
        matches!(self, Status::Failure | Status::Warning)
    }
}

/// Prints command results in the selected [`OutputFormat`]
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn success(&self, message: &str) {
        self.emit(Status::Success, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Status::Failure, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Status::Warning, message);
    }

    /// Supplementary human-only line
    pub fn note(&self, message: &str) {
        self.emit(Status::Note, message);
    }

    /// Prints a JSON document as the command's result
    pub fn json(&self, value: &Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        );
    }

    fn emit(&self, status: Status, message: &str) {
        let Some(line) = self.render(status, message) else {
            return;
        };
        if status.goes_to_stderr() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    fn render(&self, status: Status, message: &str) -> Option<String> {
        match self.format {
            OutputFormat::Human => Some(match status {
                Status::Success => format!("\u{2713} {message}"),
                Status::Failure => format!("\u{2717} error: {message}"),
                Status::Warning => format!("! warning: {message}"),
                Status::Note => format!("  {message}"),
            }),
            OutputFormat::Json => match status {
                Status::Note => None,
                _ => Some(json!({ "status": status.label(), "message": message }).to_string()),
            },
        }
    }
}

/// Renders a millisecond Unix timestamp as local time
pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}
