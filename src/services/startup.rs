use std::fs;

use log::{error, info, warn};

use crate::backup::BackupManager;
use crate::db::Database;
use crate::models::config::ServerConfig;
use crate::services::{ServiceError, ServiceResult};

/// How the database was brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupState {
    /// Restored from the named backup.
    Restored(String),
    /// No usable backup; started from an empty schema.
    Fresh,
}

/// Prepares directories and the database before the server starts serving.
///
/// The newest backup is restored when one exists. A failed restore is logged
/// and startup continues on a fresh schema. The schema and index are ensured
/// in every case.
pub fn initialize(
    db: &Database,
    backups: &BackupManager,
    config: &ServerConfig,
) -> ServiceResult<StartupState> {
    info!("Application startup...");
    fs::create_dir_all(&config.upload_dir).map_err(|e| {
        ServiceError::Internal(format!(
            "cannot create upload directory {}: {e}",
            config.upload_dir.display()
        ))
    })?;

    let state = match backups.latest_backup() {
        Some(filename) => {
            info!("Found latest backup: {filename}. Attempting to restore...");
            match backups.restore(&filename) {
                Ok(_) => {
                    info!("Successfully restored from backup.");
                    StartupState::Restored(filename)
                }
                Err(err) => {
                    error!("CRITICAL: Failed to restore from backup {filename}: {err}");
                    warn!("Proceeding with a fresh database setup.");
                    StartupState::Fresh
                }
            }
        }
        None => {
            info!("No backup found. Initializing a new database.");
            StartupState::Fresh
        }
    };

    db.connect()?;
    db.create_schema(config.embedding_dim)?;

    match db.count_embeddings() {
        Ok(total) => info!("Database ready with {total} indexed embeddings."),
        Err(err) => warn!("Could not count indexed embeddings: {err}"),
    }

    Ok(state)
}
