//! Atomic file replacement

use std::io::Write;
use std::path::Path;

use crashops_core::domain::StorageError;
use tempfile::NamedTempFile;

/// Writes `bytes` to `target` so that readers see either the old content or
/// the new content, never a mix.
///
/// The temp file lives in `target`'s directory so the final rename stays on
/// one filesystem.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| StorageError::io(format!("creating temp file in {}", dir.display()), e))?;
    tmp.write_all(bytes)
        .map_err(|e| StorageError::io("writing temp file", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io("syncing temp file", e))?;
    tmp.persist(target)
        .map_err(|e| StorageError::io(format!("renaming into {}", target.display()), e.error))?;

    Ok(())
}
