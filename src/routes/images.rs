use std::thread;

use actix_multipart::form::MultipartForm;
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use log::error;

use crate::domain::types::TopK;
use crate::dto::api::{EmbeddingRequest, ListImagesQuery, MessageResponse};
use crate::embedding::ImageEmbedder;
use crate::forms::images::{ProcessFolderForm, ProcessFolderMultipartForm, SearchByUploadForm};
use crate::models::config::ServerConfig;
use crate::repository::DieselRepository;
use crate::routes::{error_response, form_body};
use crate::services::{ServiceError, images as images_service};

#[get("/")]
pub async fn list_images(
    repo: web::Data<DieselRepository>,
    query: web::Query<ListImagesQuery>,
) -> impl Responder {
    match images_service::list_images(repo.get_ref(), query.into_inner()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => error_response("Failed to list images", &err),
    }
}

/// Starts indexing a folder in the background and answers immediately.
///
/// The `folder` field may be sent url-encoded or as multipart.
#[post("/process-folder/")]
pub async fn process_folder(
    repo: web::Data<DieselRepository>,
    embedder: web::Data<dyn ImageEmbedder>,
    server_config: web::Data<ServerConfig>,
    req: HttpRequest,
    payload: web::Payload,
) -> impl Responder {
    let mut payload = payload.into_inner();
    let form = match form_body::<ProcessFolderForm, ProcessFolderMultipartForm>(&req, &mut payload)
        .await
    {
        Ok(Some(form)) => form,
        Ok(None) => {
            let err = ServiceError::Validation("Missing form field: folder".to_string());
            return error_response("Failed to start folder processing", &err);
        }
        Err(err) => return error_response("Failed to start folder processing", &err),
    };

    let folder = match images_service::resolve_upload_folder(&server_config, &form) {
        Ok(folder) => folder,
        Err(err) => return error_response("Failed to start folder processing", &err),
    };

    let repo = repo.into_inner();
    let embedder = embedder.into_inner();
    let config = server_config.into_inner();
    let spawned = thread::Builder::new()
        .name("process-folder".to_string())
        .spawn(move || {
            if let Err(err) = images_service::process_folder(
                repo.as_ref(),
                embedder.as_ref(),
                config.as_ref(),
                &folder,
            ) {
                error!("Processing of {} failed: {err}", folder.display());
            }
        });

    match spawned {
        Ok(_) => HttpResponse::Ok().json(MessageResponse::new(format!(
            "Processing started for folder: {}. This may take some time.",
            form.folder
        ))),
        Err(e) => error_response(
            "Failed to start folder processing",
            &ServiceError::Internal(e.to_string()),
        ),
    }
}

#[post("/search-by-embedding")]
pub async fn search_by_embedding(
    repo: web::Data<DieselRepository>,
    server_config: web::Data<ServerConfig>,
    web::Json(request): web::Json<EmbeddingRequest>,
) -> impl Responder {
    match images_service::search_by_embedding(
        repo.get_ref(),
        request.embedding,
        request.top_k,
        server_config.embedding_dim,
    ) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => error_response("Failed to search by embedding", &err),
    }
}

#[post("/search-by-upload")]
pub async fn search_by_upload(
    repo: web::Data<DieselRepository>,
    embedder: web::Data<dyn ImageEmbedder>,
    MultipartForm(form): MultipartForm<SearchByUploadForm>,
) -> impl Responder {
    let SearchByUploadForm { file, top_k } = form;
    let top_k = top_k.map_or(TopK::DEFAULT, |top_k| top_k.0);
    let filename = file.file_name;
    let upload = file.file;
    let repo = repo.into_inner();
    let embedder = embedder.into_inner();

    let result = web::block(move || {
        let bytes = std::fs::read(upload.path()).map_err(|e| {
            ServiceError::Internal(format!("Failed to read uploaded file: {e}"))
        })?;
        images_service::search_by_upload(
            repo.as_ref(),
            embedder.as_ref(),
            &bytes,
            filename,
            top_k,
        )
    })
    .await
    .unwrap_or_else(|e| Err(ServiceError::Internal(e.to_string())));

    match result {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => error_response("Failed to search by upload", &err),
    }
}
