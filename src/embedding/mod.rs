//! Image embedding backends.
//!
//! [`ImageEmbedder`] is the seam between the services and the model that turns
//! images into vectors. [`clip::ClipEmbedder`] runs a CLIP-family model locally
//! through `fastembed`; [`retry::RetryingEmbedder`] wraps any embedder with a
//! constant-delay retry policy.

use std::sync::Arc;

use image::DynamicImage;
use log::info;
use thiserror::Error;

use crate::domain::types::{Embedding, TypeConstraintError};
use crate::models::config::ServerConfig;

pub mod clip;
pub mod retry;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("failed to load embedding model: {0}")]
    ModelInit(String),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model returned {actual} embeddings for {expected} images")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid embedding: {0}")]
    InvalidVector(#[from] TypeConstraintError),

    #[error("model {model} yields {actual} dimensions, embedding_dim is {configured}")]
    DimensionMismatch {
        model: String,
        configured: usize,
        actual: usize,
    },
}

impl EmbeddingError {
    /// Only inference failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Inference(_))
    }
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

pub trait ImageEmbedder: Send + Sync {
    /// Length of every vector produced by this embedder.
    fn dimension(&self) -> usize;

    /// Embeds the images in order, one vector per image.
    fn embed_images(&self, images: &[DynamicImage]) -> EmbeddingResult<Vec<Embedding>>;

    fn embed_image(&self, image: &DynamicImage) -> EmbeddingResult<Embedding> {
        let mut embeddings = self.embed_images(std::slice::from_ref(image))?;
        if embeddings.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: embeddings.len(),
            });
        }
        embeddings.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

impl<E: ImageEmbedder + ?Sized> ImageEmbedder for Arc<E> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed_images(&self, images: &[DynamicImage]) -> EmbeddingResult<Vec<Embedding>> {
        (**self).embed_images(images)
    }
}

/// Loads the configured model, checks that its vectors fit the
/// `embedding_dim` column and wraps it so failed inference is retried.
pub fn from_config(config: &ServerConfig) -> EmbeddingResult<Arc<dyn ImageEmbedder>> {
    info!("Loading embedding model {}...", config.embedding_model);
    let model = clip::ClipEmbedder::try_new(&config.embedding_model, &config.model_cache_dir)?;
    check_dimension(&config.embedding_model, model.dimension(), config.embedding_dim)?;
    info!("Embedding model loaded.");

    Ok(Arc::new(retry::RetryingEmbedder::new(
        model,
        config.embed_attempts,
        config.embed_retry_delay(),
    )))
}

fn check_dimension(model: &str, actual: usize, configured: usize) -> EmbeddingResult<()> {
    if actual == configured {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            model: model.to_string(),
            configured,
            actual,
        })
    }
}

/// Converts raw model output into validated embeddings of `dimension` length.
pub(crate) fn validate_output(
    raw: Vec<Vec<f32>>,
    expected_count: usize,
    dimension: usize,
) -> EmbeddingResult<Vec<Embedding>> {
    if raw.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: raw.len(),
        });
    }
    raw.into_iter()
        .map(|values| Embedding::with_dimension(values, dimension).map_err(EmbeddingError::from))
        .collect()
}
