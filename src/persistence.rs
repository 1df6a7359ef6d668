//! Atomic status file writes.
//!
//! The record is written to a named temporary file in the target's directory,
//! flushed to disk, then persisted over the target. The temporary file is
//! deleted when any step fails, so the previous record stays untouched.

use std::io::{self, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, error};

use crate::gate::StatusRecord;

/// Permissions applied to the status file (owner rw, group/other r).
pub const STATUS_FILE_MODE: u32 = 0o644;

/// Prefix of the temporary file created next to the target.
const TEMP_PREFIX: &str = ".maintenance-status-";

/// Write `record` to `path` via temp file + rename.
pub async fn write_status_file(path: &Path, record: &StatusRecord) -> io::Result<()> {
    let body = serde_json::to_vec(record).map_err(io::Error::other)?;
    let target = path.to_path_buf();

    let result = tokio::task::spawn_blocking(move || write_atomic(&target, &body))
        .await
        .map_err(io::Error::other)
        .and_then(|r| r);

    match result {
        Ok(()) => {
            debug!(path = %path.display(), enabled = record.enabled, "Maintenance status persisted");
            Ok(())
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to persist maintenance status");
            Err(e)
        }
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp_file = Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
    temp_file.write_all(body)?;
    temp_file.as_file().sync_all()?;
    set_mode(&temp_file)?;

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &NamedTempFile) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(STATUS_FILE_MODE))
}

#[cfg(not(unix))]
fn set_mode(_file: &NamedTempFile) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gate::MaintenanceState;

    #[tokio::test]
    async fn test_write_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        write_status_file(&path, &StatusRecord::now(true)).await.unwrap();

        let restored = MaintenanceState::restore(false, 0, Some(&path));
        assert!(restored.is_enabled());

        let record = StatusRecord::read(&path).unwrap();
        assert!(record.enabled);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        write_status_file(&path, &StatusRecord::now(true)).await.unwrap();
        write_status_file(&path, &StatusRecord::now(false)).await.unwrap();

        assert!(!StatusRecord::read(&path).unwrap().enabled);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        write_status_file(&path, &StatusRecord::now(true)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, STATUS_FILE_MODE);
    }

    #[tokio::test]
    async fn test_failed_write_preserves_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        write_status_file(&path, &StatusRecord::now(true)).await.unwrap();

        // Renaming a file over a non-empty directory fails.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();

        let result = write_status_file(&blocked, &StatusRecord::now(false)).await;
        assert!(result.is_err());

        assert!(StatusRecord::read(&path).unwrap().enabled);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("status.json");
        assert!(write_status_file(&path, &StatusRecord::now(true)).await.is_err());
    }
}
