//! HTTP handlers.
//!
//! Every error leaves the API as a JSON `{"message": ...}` body whose status
//! follows the [`ServiceError`] variant.

use std::fmt::Display;

use actix_multipart::form::{MultipartCollect, MultipartForm, MultipartFormConfig};
use actix_web::dev::Payload;
use actix_web::error::InternalError;
use actix_web::http::{StatusCode, header};
use actix_web::{FromRequest, HttpRequest, HttpResponse, web};
use log::error;
use serde::de::DeserializeOwned;

use crate::dto::api::MessageResponse;
use crate::services::{ServiceError, ServiceResult};

pub mod database;
pub mod images;
pub mod main;

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Repository(_)
        | ServiceError::Embedding(_)
        | ServiceError::Backup(_)
        | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders a service failure, logging the ones that are not the client's fault.
pub fn error_response(context: &str, err: &ServiceError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        error!("{context}: {err}");
    }
    HttpResponse::build(status).json(MessageResponse::new(err.to_string()))
}

/// Rejected request bodies and query strings answer 422 with a message body.
fn payload_error(err: impl Display) -> actix_web::Error {
    let message = err.to_string();
    let response = HttpResponse::UnprocessableEntity().json(MessageResponse::new(&message));
    InternalError::from_response(message, response).into()
}

/// Reads a form sent either url-encoded or as `multipart/form-data`.
///
/// Returns `None` only for an empty body without a form content type. Any
/// other body that cannot be read as the form is a validation error.
pub async fn form_body<F, M>(req: &HttpRequest, payload: &mut Payload) -> ServiceResult<Option<F>>
where
    F: DeserializeOwned + 'static,
    M: MultipartCollect + Into<F> + 'static,
{
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let invalid = |err: actix_web::Error| ServiceError::Validation(err.to_string());

    if content_type.starts_with("multipart/form-data") {
        let MultipartForm(form) = MultipartForm::<M>::from_request(req, payload)
            .await
            .map_err(invalid)?;
        return Ok(Some(form.into()));
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let web::Form(form) = web::Form::<F>::from_request(req, payload)
            .await
            .map_err(invalid)?;
        return Ok(Some(form));
    }

    let body = web::Bytes::from_request(req, payload)
        .await
        .map_err(invalid)?;
    if body.is_empty() {
        Ok(None)
    } else {
        Err(ServiceError::Validation(format!(
            "Unsupported content type '{content_type}'"
        )))
    }
}

/// Mounts every route of the API.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| payload_error(err)))
        .app_data(web::FormConfig::default().error_handler(|err, _| payload_error(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _| payload_error(err)))
        .app_data(MultipartFormConfig::default().error_handler(|err, _| payload_error(err)))
        .service(main::health)
        .service(
            web::scope("/images")
                .service(images::list_images)
                .service(images::process_folder)
                .service(images::search_by_embedding)
                .service(images::search_by_upload),
        )
        .service(
            web::scope("/database")
                .service(database::backup_database)
                .service(database::restore_database),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::errors::RepositoryError;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            status_for(&ServiceError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ServiceError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ServiceError::BadRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ServiceError::from(RepositoryError::ConnectionError(
                "closed".into()
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ServiceError::Repository(RepositoryError::DatabaseError(
                "boom".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
