use serde::Serialize;

use crate::domain::types::{Embedding, ImageId};

/// Indexed image as listed to clients.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub filename: String,
    /// Path relative to the upload directory, with a `#variant` suffix for
    /// augmented copies.
    pub filepath: String,
}

/// Search hit with its cosine similarity to the query (`1 - distance`).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SimilarImage {
    pub id: ImageId,
    pub filename: String,
    pub filepath: String,
    pub similarity: f64,
}

/// Embedding waiting to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewImageEmbedding {
    pub filename: String,
    pub filepath: String,
    pub embedding: Embedding,
}

impl NewImageEmbedding {
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        filepath: impl Into<String>,
        embedding: Embedding,
    ) -> Self {
        Self {
            filename: filename.into(),
            filepath: filepath.into(),
            embedding,
        }
    }
}
