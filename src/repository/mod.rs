use std::sync::Arc;

use crate::db::{Database, DbConnection};
use crate::domain::image::{ImageRecord, NewImageEmbedding, SimilarImage};
use crate::domain::types::{Embedding, TopK};
use crate::repository::errors::RepositoryResult;

pub mod errors;
pub mod image;
#[cfg(feature = "test-mocks")]
pub mod mock;

pub const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageListQuery {
    pub limit: usize,
    pub offset: usize,
}

impl ImageListQuery {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for ImageListQuery {
    fn default() -> Self {
        Self::new()
    }
}

pub trait ImageReader {
    /// Nearest neighbours by cosine distance, closest first.
    fn search_similar(&self, embedding: &Embedding, top_k: TopK)
    -> RepositoryResult<Vec<SimilarImage>>;
    /// Indexed images ordered by id.
    fn list_images(&self, query: ImageListQuery) -> RepositoryResult<Vec<ImageRecord>>;
}

pub trait ImageWriter {
    /// Inserts the batch, skipping rows whose `filepath` already exists.
    /// Returns the number of inserted rows.
    fn insert_embeddings(&self, records: &[NewImageEmbedding]) -> RepositoryResult<usize>;
}

/// Diesel-backed repository shared by all handlers.
#[derive(Clone)]
pub struct DieselRepository {
    db: Arc<Database>,
}

impl DieselRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn conn(&self) -> RepositoryResult<DbConnection> {
        self.db.get_connection()
    }
}
