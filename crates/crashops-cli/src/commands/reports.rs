//! Reports command - Inspect and manage stored crash reports
//!
//! Provides the `crashops reports` CLI command with subcommands:
//! - `list`: Show stored reports, oldest first
//! - `view <id>`: Display one report with its stack trace
//! - `deliver`: Send every pending report to the collector now
//! - `clear`: Delete all reports and setting overrides

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use crashops_core::config::Config;
use crashops_core::domain::{ReportId, StoredReport};
use crashops_core::ports::{IRemoteTransport, IReportStore};
use crashops_delivery::{DeliveryScheduler, HttpTransport, RunOutcome};
use tokio::runtime::Handle;
use tracing::info;

use super::open_store;
use crate::output::{format_timestamp, OutputFormat, Printer};

/// Report management subcommands
#[derive(Debug, Subcommand)]
pub enum ReportsCommand {
    /// List stored reports
    List {
        /// Only show reports not yet delivered
        #[arg(long)]
        pending: bool,
    },
    /// View a specific report
    View {
        /// Report id as shown by `list`
        id: String,
    },
    /// Deliver pending reports now
    Deliver,
    /// Delete every stored report and setting override
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

impl ReportsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        match self {
            ReportsCommand::List { pending } => execute_list(config, *pending, format),
            ReportsCommand::View { id } => execute_view(config, id, format),
            ReportsCommand::Deliver => execute_deliver(config, format).await,
            ReportsCommand::Clear { yes } => execute_clear(config, *yes, format),
        }
    }
}

fn execute_list(config: &Config, pending_only: bool, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);
    let store = open_store(config)?;

    let reports = if pending_only {
        store.list_pending()?
    } else {
        store.list_all()?
    };

    if printer.is_json() {
        let json: Vec<serde_json::Value> = reports.iter().map(summary_json).collect();
        printer.json(&serde_json::json!(json));
        return Ok(());
    }

    if reports.is_empty() {
        printer.note("No reports found.");
        return Ok(());
    }

    println!(
        "{:<8} {:<20} {:<9} {:<10} {}",
        "ID", "Captured", "Kind", "Status", "Title"
    );
    println!("{}", "-".repeat(72));
    for stored in &reports {
        let report = &stored.report;
        println!(
            "{:<8} {:<20} {:<9} {:<10} {}",
            stored.id,
            format_timestamp(report.timestamp()),
            if report.is_fatal() { "crash" } else { "error" },
            if report.is_delivered() { "delivered" } else { "pending" },
            report.title(),
        );
    }
    println!();
    println!(
        "Total: {} report(s), {} pending",
        reports.len(),
        store.pending_count()
    );
    Ok(())
}

fn execute_view(config: &Config, raw_id: &str, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);
    let id: ReportId = raw_id
        .parse()
        .with_context(|| format!("Invalid report id '{raw_id}'"))?;
    let store = open_store(config)?;

    let Some(stored) = store.get(id)? else {
        printer.error(&format!("Report {id} not found"));
        return Ok(());
    };

    if printer.is_json() {
        let json = serde_json::to_value(&stored).context("Failed to serialize report")?;
        printer.json(&json);
        return Ok(());
    }

    let report = &stored.report;
    println!("Report {}: {}", stored.id, report.title());
    println!("  Captured:  {}", format_timestamp(report.timestamp()));
    println!("  Session:   {}", report.session_id());
    println!("  Thread:    {}", report.thread().unwrap_or("<unnamed>"));
    println!("  Fatal:     {}", report.is_fatal());
    println!("  Delivered: {}", report.is_delivered());

    if !report.details().is_empty() {
        println!();
        println!("Details:");
        for (key, value) in report.details() {
            println!("  {key} = {value}");
        }
    }
    if !report.stack_trace().is_empty() {
        println!();
        println!("Stack trace:");
        for (i, frame) in report.stack_trace().iter().enumerate() {
            println!("  {i:>3}: {frame}");
        }
    }
    Ok(())
}

async fn execute_deliver(config: &Config, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);
    let store = open_store(config)?;
    let transport: Arc<dyn IRemoteTransport> =
        Arc::new(HttpTransport::new(&config.delivery).context("Failed to create HTTP transport")?);

    let scheduler = DeliveryScheduler::new(
        store,
        transport,
        Handle::current(),
        config.delivery.interval(),
        config.capture.enabled,
    );

    info!(endpoint = %config.delivery.endpoint, "Delivering pending reports");
    let outcome = scheduler.run_now().await;

    if printer.is_json() {
        printer.json(&outcome_json(&outcome));
        return Ok(());
    }

    match outcome {
        RunOutcome::Success { delivered } => {
            printer.success(&format!("Delivered {delivered} report(s)"));
        }
        RunOutcome::Failure {
            delivered,
            remaining,
            error,
        } => {
            printer.error(&format!(
                "Delivered {delivered} report(s), {remaining} still pending: {error}"
            ));
        }
        RunOutcome::Skipped => {
            printer.warn("Delivery is disabled; nothing was sent");
        }
    }
    Ok(())
}

fn execute_clear(config: &Config, confirmed: bool, format: OutputFormat) -> Result<()> {
    let printer = Printer::new(format);
    if !confirmed {
        printer.warn("This deletes every stored report. Re-run with --yes to confirm.");
        return Ok(());
    }

    let store = open_store(config)?;
    if store.clear_all() {
        printer.success("All reports and setting overrides removed");
    } else {
        printer.error("Some entries could not be removed");
    }
    Ok(())
}

fn summary_json(stored: &StoredReport) -> serde_json::Value {
    let report = &stored.report;
    serde_json::json!({
        "id": stored.id,
        "title": report.title(),
        "timestamp": report.timestamp(),
        "fatal": report.is_fatal(),
        "delivered": report.is_delivered(),
        "frames": report.stack_trace().len(),
    })
}

fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    match outcome {
        RunOutcome::Success { delivered } => serde_json::json!({
            "success": true,
            "delivered": delivered,
            "remaining": 0,
        }),
        RunOutcome::Failure {
            delivered,
            remaining,
            error,
        } => serde_json::json!({
            "success": false,
            "delivered": delivered,
            "remaining": remaining,
            "error": error,
        }),
        RunOutcome::Skipped => serde_json::json!({
            "success": false,
            "skipped": true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashops_core::domain::{CrashReport, SessionId};

    #[test]
    fn test_summary_json_fields() {
        let report = CrashReport::new("NullPointer", SessionId::new())
            .unwrap()
            .with_fatal(false);
        let stored = StoredReport {
            id: ReportId::new(7),
            report,
        };

        let json = summary_json(&stored);
        assert_eq!(json["id"], 7);
        assert_eq!(json["title"], "NullPointer");
        assert_eq!(json["fatal"], false);
        assert_eq!(json["delivered"], false);
    }

    #[test]
    fn test_outcome_json() {
        let json = outcome_json(&RunOutcome::Failure {
            delivered: 2,
            remaining: 1,
            error: "HTTP 503".into(),
        });
        assert_eq!(json["success"], false);
        assert_eq!(json["remaining"], 1);
        assert_eq!(outcome_json(&RunOutcome::Skipped)["skipped"], true);
    }

    #[test]
    fn test_list_and_clear_against_temp_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();

        {
            let store = open_store(&config).unwrap();
            store
                .append(&CrashReport::new("Boom", SessionId::new()).unwrap())
                .unwrap();
        }

        execute_list(&config, true, OutputFormat::Json).unwrap();
        execute_clear(&config, false, OutputFormat::Json).unwrap();
        assert_eq!(open_store(&config).unwrap().pending_count(), 1);

        execute_clear(&config, true, OutputFormat::Json).unwrap();
        assert_eq!(open_store(&config).unwrap().pending_count(), 0);
    }
}
