use std::thread;

use actix_web::{HttpRequest, HttpResponse, Responder, post, web};
use log::error;

use crate::backup::BackupManager;
use crate::dto::api::{BackupStartedResponse, RestoreStartedResponse};
use crate::forms::database::{RestoreForm, RestoreMultipartForm};
use crate::routes::{error_response, form_body};
use crate::services::{ServiceError, database as database_service};

fn spawn_job<F>(name: &str, job: F) -> Result<(), ServiceError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(job)
        .map(|_| ())
        .map_err(|e| ServiceError::Internal(format!("Failed to start {name}: {e}")))
}

#[post("/backup")]
pub async fn backup_database(backups: web::Data<BackupManager>) -> impl Responder {
    let path = match database_service::prepare_backup(&backups) {
        Ok(path) => path,
        Err(err) => return error_response("Failed to start backup", &err),
    };
    let backup_file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let manager = backups.into_inner();
    let started = spawn_job("database-backup", move || {
        if let Err(err) = database_service::backup_database(&manager, &path) {
            error!("Background backup failed: {err}");
        }
    });

    match started {
        Ok(()) => HttpResponse::Ok().json(BackupStartedResponse {
            message: "Database backup process started.".to_string(),
            backup_file,
        }),
        Err(err) => error_response("Failed to start backup", &err),
    }
}

/// Restores the requested backup, or the newest one when no name is given.
///
/// `filename` may be sent url-encoded or as multipart. A body that cannot be
/// read is rejected rather than falling back to the newest backup.
#[post("/restore")]
pub async fn restore_database(
    backups: web::Data<BackupManager>,
    req: HttpRequest,
    payload: web::Payload,
) -> impl Responder {
    let mut payload = payload.into_inner();
    let requested = match form_body::<RestoreForm, RestoreMultipartForm>(&req, &mut payload).await
    {
        Ok(form) => form.and_then(RestoreForm::requested),
        Err(err) => return error_response("Failed to start restore", &err),
    };
    let filename = match database_service::prepare_restore(&backups, requested) {
        Ok((filename, _)) => filename,
        Err(err) => return error_response("Failed to start restore", &err),
    };

    let manager = backups.into_inner();
    let target = filename.clone();
    let started = spawn_job("database-restore", move || {
        if let Err(err) = database_service::restore_database(&manager, &target) {
            error!("Background restore failed: {err}");
        }
    });

    match started {
        Ok(()) => HttpResponse::Ok().json(RestoreStartedResponse {
            message: "Database restore process started.".to_string(),
            restored_from: filename,
        }),
        Err(err) => error_response("Failed to start restore", &err),
    }
}
