pub mod config;
pub mod reports;
pub mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use crashops_core::config::Config;
use crashops_store::FileReportStore;

/// Opens the report store named by the configuration
pub(crate) fn open_store(config: &Config) -> Result<Arc<FileReportStore>> {
    let store = FileReportStore::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open report store at {}",
            config.storage.data_dir.display()
        )
    })?;
    Ok(Arc::new(store))
}
