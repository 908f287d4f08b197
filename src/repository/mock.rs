//! Mock repository implementations for isolating services in tests.

use mockall::mock;

use crate::domain::image::{ImageRecord, NewImageEmbedding, SimilarImage};
use crate::domain::types::{Embedding, TopK};
use crate::repository::errors::RepositoryResult;
use crate::repository::{ImageListQuery, ImageReader, ImageWriter};

mock! {
    pub Repository {}

    impl ImageReader for Repository {
        fn search_similar(
            &self,
            embedding: &Embedding,
            top_k: TopK,
        ) -> RepositoryResult<Vec<SimilarImage>>;
        fn list_images(&self, query: ImageListQuery) -> RepositoryResult<Vec<ImageRecord>>;
    }

    impl ImageWriter for Repository {
        fn insert_embeddings(&self, records: &[NewImageEmbedding]) -> RepositoryResult<usize>;
    }
}
