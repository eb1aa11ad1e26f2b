//! Snapshot backup.
//!
//! The snapshot directory tree is copied verbatim to a timestamped
//! directory under the backup root before anything is written to the
//! target; the copy is the recovery path if the migration goes wrong.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::debug;

use crate::error::BackupError;

pub const BACKUP_DIR_PREFIX: &str = "snapshot";

/// Copies `snapshot_dir` to `<backup_root>/snapshot_<YYYYMMDD_HHMMSS>`
/// and returns the created path.
pub fn backup_snapshot(snapshot_dir: &Path, backup_root: &Path) -> Result<PathBuf, BackupError> {
    if !snapshot_dir.is_dir() {
        return Err(BackupError::MissingSnapshot(snapshot_dir.to_path_buf()));
    }
    fs::create_dir_all(backup_root).map_err(|source| BackupError::Copy {
        path: backup_root.to_path_buf(),
        source,
    })?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup_dir = backup_root.join(format!("{BACKUP_DIR_PREFIX}_{timestamp}"));
    copy_dir_recursive(snapshot_dir, &backup_dir)?;
    Ok(backup_dir)
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), BackupError> {
    fs::create_dir_all(to).map_err(|source| BackupError::Copy {
        path: to.to_path_buf(),
        source,
    })?;

    let entries = fs::read_dir(from).map_err(|source| BackupError::Copy {
        path: from.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| BackupError::Copy {
            path: from.to_path_buf(),
            source,
        })?;
        let source_path = entry.path();
        let target_path = to.join(entry.file_name());
        if source_path.is_dir() {
            copy_dir_recursive(&source_path, &target_path)?;
        } else {
            debug!(file = %source_path.display(), "Backing up");
            fs::copy(&source_path, &target_path).map_err(|source| BackupError::Copy {
                path: source_path.clone(),
                source,
            })?;
        }
    }
    Ok(())
}
