//! JSON payloads exchanged by the HTTP API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::image::{ImageRecord, SimilarImage};
use crate::domain::types::TopK;
use crate::repository::DEFAULT_LIST_LIMIT;

fn default_top_k() -> usize {
    TopK::DEFAULT
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// Search request carrying a pre-computed embedding.
#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    pub embedding: Vec<f32>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Paging parameters of `GET /images/`.
#[derive(Debug, Deserialize, Validate)]
pub struct ListImagesQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query_filename: Option<String>,
    pub similar_images: Vec<SimilarImage>,
}

#[derive(Debug, Serialize)]
pub struct ListImagesResponse {
    pub images: Vec<ImageRecord>,
}

/// Body of plain acknowledgements and of every error response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackupStartedResponse {
    pub message: String,
    pub backup_file: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreStartedResponse {
    pub message: String,
    pub restored_from: String,
}
