//! Backup and restore requests.
//!
//! Handlers validate synchronously through the `prepare_*` functions and run
//! the returned job in the background.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};

use crate::backup::{BackupManager, backup_file_name};
use crate::services::{ServiceError, ServiceResult};

/// Target file of a backup that is about to start.
pub fn prepare_backup(manager: &BackupManager) -> ServiceResult<PathBuf> {
    let filename = backup_file_name(Local::now().naive_local());
    Ok(manager.resolve(&filename)?)
}

/// Picks the backup to restore: the requested one, or the newest on disk.
///
/// Fails with `NotFound` when nothing can be restored so that the caller can
/// answer before starting any work.
pub fn prepare_restore(
    manager: &BackupManager,
    requested: Option<String>,
) -> ServiceResult<(String, PathBuf)> {
    let filename = match requested {
        Some(filename) => filename,
        None => manager
            .latest_backup()
            .ok_or_else(|| ServiceError::NotFound("No backup file found to restore.".into()))?,
    };

    let path = manager.resolve(&filename)?;
    if !path.is_file() {
        return Err(ServiceError::NotFound(format!(
            "Backup file not found: {}",
            path.display()
        )));
    }
    Ok((filename, path))
}

/// Runs `pg_dump` into `path`.
pub fn backup_database(manager: &BackupManager, path: &Path) -> ServiceResult<()> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ServiceError::Internal(format!("bad backup path {}", path.display())))?;

    match manager.backup(filename) {
        Ok(done) => {
            info!("Database backed up to {}", done.display());
            Ok(())
        }
        Err(err) => {
            error!("Database backup failed: {err}");
            Err(err.into())
        }
    }
}

/// Restores from `filename`; the pool is reopened whatever the outcome.
pub fn restore_database(manager: &BackupManager, filename: &str) -> ServiceResult<()> {
    match manager.restore(filename) {
        Ok(path) => {
            info!("Database restored from {}", path.display());
            Ok(())
        }
        Err(err) => {
            error!("Database restore failed: {err}");
            Err(err.into())
        }
    }
}
