//! Stack trace extraction
//!
//! Turns a `std::backtrace::Backtrace` into [`StackFrame`]s and strips the
//! frames that belong to the panic machinery and to CrashOps itself, so a trace
//! starts at the code that actually failed.

use std::backtrace::Backtrace;
use std::panic::Location;

use crashops_core::domain::StackFrame;

/// Upper bound on frames kept per report
pub const MAX_FRAMES: usize = 128;

/// Function-name prefixes of frames raised by the panic runtime itself
const PANIC_MACHINERY: &[&str] = &[
    "std::panicking::",
    "core::panicking::",
    "rust_begin_unwind",
    "std::panic::panic_any",
    "std::rt::begin_panic",
    "__rustc::rust_begin_unwind",
];

/// Function-name prefixes that are never part of a report
const ALWAYS_HIDDEN: &[&str] = &[
    "std::backtrace::",
    "std::backtrace_rs::",
    "std::sys::backtrace::",
    "std::sys_common::backtrace::",
    "__rust_end_short_backtrace",
    "__rust_begin_short_backtrace",
    "crashops_capture::",
    "crashops::context::",
];

/// Resolves and trims a captured backtrace
///
/// Falls back to the single `fallback` frame when nothing usable remains,
/// so the result is never empty.
pub fn frames_from_backtrace(backtrace: &Backtrace, fallback: StackFrame) -> Vec<StackFrame> {
    let frames = trim_internal(parse_backtrace(&backtrace.to_string()));
    if frames.is_empty() {
        vec![fallback]
    } else {
        frames
    }
}

/// The single frame used when no backtrace is collected
pub fn location_frame(location: Option<&Location<'_>>) -> StackFrame {
    match location {
        Some(loc) => StackFrame::new(
            "<location>",
            Some(loc.file().to_string()),
            Some(loc.line()),
        ),
        None => StackFrame::new("<unknown>", None, None),
    }
}

/// Parses the text rendering of a `Backtrace`
///
/// The format is a numbered symbol line optionally followed by an
/// `at file:line:col` line:
///
/// ```text
///    3: app::checkout::pay
///              at ./src/checkout.rs:42:9
/// ```
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_none() {
                    let (file, line_no) = split_location(location);
                    frame.file = Some(file);
                    frame.line = line_no;
                }
            }
            continue;
        }

        if let Some((index, symbol)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(StackFrame::new(symbol.trim(), None, None));
            }
        }
    }

    frames
}

/// Drops everything up to and including the panic-runtime frames, then
/// hides runtime and capture frames anywhere in the remainder.
///
/// Only the first run of runtime frames counts: `std::panicking::try` frames
/// further out come from `catch_unwind` callers and stay in the trace.
pub fn trim_internal(frames: Vec<StackFrame>) -> Vec<StackFrame> {
    let mut start = 0;
    if let Some(first) = frames
        .iter()
        .position(|f| matches_any(&f.function, PANIC_MACHINERY))
    {
        start = first;
        while frames.get(start).is_some_and(|f| {
            matches_any(&f.function, PANIC_MACHINERY) || matches_any(&f.function, ALWAYS_HIDDEN)
        }) {
            start += 1;
        }
    }

    frames
        .into_iter()
        .skip(start)
        .filter(|f| !matches_any(&f.function, ALWAYS_HIDDEN))
        .take(MAX_FRAMES)
        .collect()
}

fn matches_any(function: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| function.starts_with(p))
}

/// `file:line:col` → (`file`, `line`). Paths may themselves contain colons.
fn split_location(location: &str) -> (String, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    let file = parts.next();

    match (file, line, col) {
        (Some(file), Some(line), Some(col))
            if line.parse::<u32>().is_ok() && col.parse::<u32>().is_ok() =>
        {
            (file.to_string(), line.parse().ok())
        }
        _ => (location.to_string(), None),
    }
}
