use actix_web::{HttpResponse, Responder, get};

use crate::dto::api::MessageResponse;

#[get("/")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(MessageResponse::new("Image Embedding API is running."))
}
