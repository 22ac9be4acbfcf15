//! Well-known setting keys
//!
//! Values resolve as: persisted override, else the default supplied by the
//! settings source (see `Config::setting_defaults`).

/// Master toggle for capture and delivery
pub const ENABLED: &str = "crashops.enabled";

/// Whether full stack traces are collected (otherwise only the failure location)
pub const COLLECT_TRACES: &str = "crashops.collect_traces";

/// Seconds between periodic delivery runs
pub const DELIVERY_INTERVAL_SECS: &str = "crashops.delivery_interval_secs";

/// Longest accepted delivery interval, 30 days
pub const MAX_DELIVERY_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Application key issued by the collector
pub const APP_KEY: &str = "crashops.app_key";

/// Milliseconds since epoch of the last finished delivery run
pub const LAST_DELIVERY_AT: &str = "crashops.last_delivery_at";

/// Longest accepted application key
pub const MAX_APP_KEY_LEN: usize = 100;
