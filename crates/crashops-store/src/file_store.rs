//! File-backed [`IReportStore`] implementation
//!
//! One JSON file per report under `reports/`, named by its zero-padded id so
//! lexical and numeric order agree, plus a single `settings.json` holding the
//! persisted setting overrides.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crashops_core::domain::{CrashReport, ReportId, Scalar, StorageError, StoredReport};
use crashops_core::ports::IReportStore;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;

const REPORTS_DIR: &str = "reports";
const SETTINGS_FILE: &str = "settings.json";
const RECORD_EXT: &str = "json";

/// Mutable state guarded by the store's single lock
#[derive(Debug)]
struct Inner {
    /// Id handed out by the next `append`
    next_id: u64,
    /// Ids of readable records with `delivered == false`
    pending: BTreeSet<u64>,
    /// Every setting value set in this process, persisted or not
    settings: HashMap<String, Scalar>,
    /// Mirror of `settings.json`
    persisted: BTreeMap<String, Scalar>,
}

/// Persistent report store over a data directory
///
/// Safe to share across threads; every operation takes one coarse lock, so
/// an append can never interleave with a listing or a `clear_all`.
#[derive(Debug)]
pub struct FileReportStore {
    data_dir: PathBuf,
    reports_dir: PathBuf,
    settings_path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileReportStore {
    /// Opens (or creates) a store rooted at `data_dir`
    ///
    /// Recovers the next report id and the pending index from the records
    /// on disk. A malformed `settings.json` is logged and ignored so that
    /// capture keeps working with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directories cannot be created or
    /// listed.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let reports_dir = data_dir.join(REPORTS_DIR);
        std::fs::create_dir_all(&reports_dir).map_err(|e| {
            StorageError::io(format!("creating {}", reports_dir.display()), e)
        })?;

        let settings_path = data_dir.join(SETTINGS_FILE);
        let persisted = load_settings(&settings_path);

        let ids = scan_ids(&reports_dir)?;
        let next_id = ids.last().map_or(1, |last| last + 1);
        let pending = pending_ids(&reports_dir, &ids);

        info!(
            path = %data_dir.display(),
            reports = ids.len(),
            pending = pending.len(),
            "Report store opened"
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            reports_dir,
            settings_path,
            inner: Mutex::new(Inner {
                next_id,
                pending,
                settings: persisted
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                persisted,
            }),
        })
    }

    /// Root directory of this store
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Setting overrides that survive a restart
    pub fn persisted_settings(&self) -> BTreeMap<String, Scalar> {
        self.lock().persisted.clone()
    }

    /// Poisoning is ignored: the state is always left consistent between
    /// statements, and a capture must never fail on a lock.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_path(&self, id: u64) -> PathBuf {
        record_path(&self.reports_dir, id)
    }

}

impl IReportStore for FileReportStore {
    fn append(&self, report: &CrashReport) -> Result<ReportId, StorageError> {
        let mut inner = self.lock();
        let id = ReportId::new(inner.next_id);
        let stored = StoredReport {
            id,
            report: report.clone(),
        };

        let bytes = encode_record(&stored)?;
        write_atomic(&self.record_path(id.value()), &bytes)?;

        inner.next_id = id.next().value();
        if !report.is_delivered() {
            inner.pending.insert(id.value());
        }

        debug!(report_id = %id, title = report.title(), "Report appended");
        Ok(id)
    }

    /// Reads only the indexed pending records. A record that can no longer
    /// be read, or was marked delivered behind the store's back, leaves the
    /// index until the next `open`.
    fn list_pending(&self) -> Result<Vec<StoredReport>, StorageError> {
        let mut inner = self.lock();

        let mut out = Vec::with_capacity(inner.pending.len());
        let mut stale = Vec::new();
        for &id in &inner.pending {
            match read_record(&self.record_path(id)) {
                Ok(stored) if !stored.report.is_delivered() => out.push(stored),
                Ok(_) => stale.push(id),
                Err(e) => {
                    warn!(report_id = id, error = %e, "Dropping unreadable report from pending");
                    stale.push(id);
                }
            }
        }
        for id in stale {
            inner.pending.remove(&id);
        }
        Ok(out)
    }

    fn list_all(&self) -> Result<Vec<StoredReport>, StorageError> {
        let _guard = self.lock();
        let ids = scan_ids(&self.reports_dir)?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match read_record(&self.record_path(id)) {
                Ok(stored) => out.push(stored),
                Err(e) => warn!(report_id = id, error = %e, "Skipping unreadable report"),
            }
        }
        Ok(out)
    }

    fn get(&self, id: ReportId) -> Result<Option<StoredReport>, StorageError> {
        let _guard = self.lock();
        let path = self.record_path(id.value());
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    fn mark_delivered(&self, id: ReportId) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        let path = self.record_path(id.value());
        if !path.exists() {
            return Ok(false);
        }

        let mut stored = read_record(&path)?;
        if stored.report.mark_delivered() {
            let bytes = encode_record(&stored)?;
            write_atomic(&path, &bytes)?;
            debug!(report_id = %id, "Report marked delivered");
        }
        inner.pending.remove(&id.value());
        Ok(true)
    }

    fn clear_all(&self) -> bool {
        let mut inner = self.lock();
        let mut complete = true;

        match scan_ids(&self.reports_dir) {
            Ok(ids) => {
                for id in ids {
                    let path = self.record_path(id);
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!(report_id = id, error = %e, "Failed to delete report");
                        complete = false;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list reports for deletion");
                complete = false;
            }
        }

        match std::fs::remove_file(&self.settings_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, "Failed to delete settings file");
                complete = false;
            }
        }

        inner.settings.clear();
        inner.persisted.clear();
        if let Ok(ids) = scan_ids(&self.reports_dir) {
            inner.pending = pending_ids(&self.reports_dir, &ids);
        }

        info!(complete, remaining_pending = inner.pending.len(), "Report store cleared");
        complete
    }

    fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    fn get_setting(&self, key: &str, default: Scalar) -> Scalar {
        self.lock().settings.get(key).cloned().unwrap_or(default)
    }

    fn set_setting(&self, key: &str, value: Scalar, persist: bool) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.settings.insert(key.to_string(), value.clone());

        if persist {
            let mut next = inner.persisted.clone();
            next.insert(key.to_string(), value);
            let bytes = serde_json::to_vec_pretty(&next)?;
            write_atomic(&self.settings_path, &bytes)?;
            inner.persisted = next;
            debug!(key, "Setting persisted");
        }
        Ok(())
    }
}

// ============================================================================
// Disk helpers
// ============================================================================

fn record_path(reports_dir: &Path, id: u64) -> PathBuf {
    reports_dir.join(format!("{id:020}.{RECORD_EXT}"))
}

/// Ids of every record file, ascending. Stray files (temp files, editor
/// backups) are ignored.
fn scan_ids(reports_dir: &Path) -> Result<Vec<u64>, StorageError> {
    let entries = std::fs::read_dir(reports_dir)
        .map_err(|e| StorageError::io(format!("listing {}", reports_dir.display()), e))?;

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io("reading directory entry", e))?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != RECORD_EXT) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Serializes a record, refusing bytes that would not read back
fn encode_record(stored: &StoredReport) -> Result<Vec<u8>, StorageError> {
    let bytes = serde_json::to_vec_pretty(stored)?;
    serde_json::from_slice::<StoredReport>(&bytes)?;
    Ok(bytes)
}

fn read_record(path: &Path) -> Result<StoredReport, StorageError> {
    let content = std::fs::read(path)
        .map_err(|e| StorageError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_slice(&content).map_err(|e| StorageError::Corrupted {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn pending_ids(reports_dir: &Path, ids: &[u64]) -> BTreeSet<u64> {
    ids.iter()
        .copied()
        .filter(|id| {
            read_record(&record_path(reports_dir, *id))
                .is_ok_and(|stored| !stored.report.is_delivered())
        })
        .collect()
}

fn load_settings(path: &Path) -> BTreeMap<String, Scalar> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read settings, using defaults");
            return BTreeMap::new();
        }
    };

    serde_json::from_slice(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Malformed settings ignored");
        BTreeMap::new()
    })
}
