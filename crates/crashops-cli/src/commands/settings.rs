//! Settings command - Read and override runtime settings
//!
//! Overrides live in the report store next to the reports, so they apply to
//! every process that embeds CrashOps with the same data directory.

use anyhow::{bail, Result};
use clap::Subcommand;
use crashops_core::config::Config;
use crashops_core::domain::{settings, Scalar};
use crashops_core::ports::IReportStore;
use tracing::info;

use super::open_store;
use crate::output::{OutputFormat, Printer};

/// Settings subcommands
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show every known setting with its effective value
    List,
    /// Show one setting
    Get {
        /// Setting key (e.g., "crashops.enabled")
        key: String,
    },
    /// Persist an override for a setting
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
}

const KNOWN_KEYS: &[&str] = &[
    settings::ENABLED,
    settings::COLLECT_TRACES,
    settings::DELIVERY_INTERVAL_SECS,
    settings::APP_KEY,
    settings::LAST_DELIVERY_AT,
];

impl SettingsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let printer = Printer::new(format);
        let store = open_store(config)?;

        match self {
            SettingsCommand::List => {
                let values: Vec<(&str, Scalar)> = KNOWN_KEYS
                    .iter()
                    .filter_map(|key| {
                        setting_default(config, key)
                            .map(|default| (*key, store.get_setting(key, default)))
                    })
                    .collect();

                if printer.is_json() {
                    let map: serde_json::Map<String, serde_json::Value> = values
                        .iter()
                        .map(|(key, value)| (key.to_string(), serde_json::json!(value)))
                        .collect();
                    printer.json(&serde_json::Value::Object(map));
                } else {
                    for (key, value) in &values {
                        println!("{key:<34} {value}");
                    }
                }
            }

            SettingsCommand::Get { key } => {
                let Some(default) = setting_default(config, key) else {
                    bail!("Unknown setting '{key}'");
                };
                let value = store.get_setting(key, default);
                if printer.is_json() {
                    printer.json(&serde_json::json!({ "key": key, "value": value }));
                } else {
                    println!("{value}");
                }
            }

            SettingsCommand::Set { key, value } => {
                let parsed = parse_setting(key, value)?;
                info!(key = %key, value = %parsed, "Persisting setting override");
                store.set_setting(key, parsed.clone(), true)?;

                if printer.is_json() {
                    printer.json(&serde_json::json!({
                        "success": true,
                        "key": key,
                        "value": parsed,
                    }));
                } else {
                    printer.success(&format!("Set {key} = {parsed}"));
                }
            }
        }

        Ok(())
    }
}

/// Default of a known setting; `None` for unknown keys
fn setting_default(config: &Config, key: &str) -> Option<Scalar> {
    match key {
        settings::APP_KEY => Some(Scalar::Text(String::new())),
        settings::LAST_DELIVERY_AT => Some(Scalar::Int(0)),
        _ => config.setting_defaults().remove(key),
    }
}

/// Parses and checks a value for a writable setting
fn parse_setting(key: &str, raw: &str) -> Result<Scalar> {
    match key {
        settings::ENABLED | settings::COLLECT_TRACES => match Scalar::parse_lossy(raw) {
            Scalar::Bool(b) => Ok(Scalar::Bool(b)),
            _ => bail!("Expected true or false for {key}"),
        },
        settings::DELIVERY_INTERVAL_SECS => match Scalar::parse_lossy(raw) {
            Scalar::Int(secs)
                if u64::try_from(secs)
                    .is_ok_and(|s| (1..=settings::MAX_DELIVERY_INTERVAL_SECS).contains(&s)) =>
            {
                Ok(Scalar::Int(secs))
            }
            _ => bail!(
                "Expected 1 to {} seconds for {key}",
                settings::MAX_DELIVERY_INTERVAL_SECS
            ),
        },
        settings::APP_KEY => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.chars().count() > settings::MAX_APP_KEY_LEN {
                bail!(
                    "Application key must be 1 to {} characters",
                    settings::MAX_APP_KEY_LEN
                );
            }
            Ok(Scalar::Text(trimmed.to_string()))
        }
        settings::LAST_DELIVERY_AT => bail!("{key} is maintained by the delivery worker"),
        _ => bail!("Unknown setting '{key}'"),
    }
}
