//! Config command - View and validate the CrashOps configuration file

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use crashops_core::config::Config;
use tracing::info;

use crate::output::{OutputFormat, Printer};

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if printer.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        printer.json(&json);
    } else {
        printer.success(&format!("Configuration ({})", config_path.display()));
        printer.note("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            printer.note(line);
        }
    }

    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);

    if !config_path.exists() {
        if printer.is_json() {
            printer.json(&serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "errors": [],
                "defaults": true,
            }));
        } else {
            printer.note(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            printer.note("Built-in defaults are in use.");
        }
        return Ok(());
    }

    let errors: Vec<String> = match Config::load(config_path) {
        Ok(config) => config.validate().iter().map(ToString::to_string).collect(),
        Err(e) => vec![e.to_string()],
    };

    info!(config_path = %config_path.display(), errors = errors.len(), "Validated configuration");

    if printer.is_json() {
        printer.json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": errors,
        }));
    } else if errors.is_empty() {
        printer.success("Configuration is valid");
        printer.note(&format!("File: {}", config_path.display()));
    } else {
        printer.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        printer.note(&format!("File: {}", config_path.display()));
        for error in &errors {
            printer.note(&format!("  {error}"));
        }
    }

    Ok(())
}
