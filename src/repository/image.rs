use diesel::prelude::*;
use pgvector::{Vector, VectorExpressionMethods};

use crate::domain::image::{ImageRecord, NewImageEmbedding, SimilarImage};
use crate::domain::types::{Embedding, TopK};
use crate::repository::errors::{RepositoryError, RepositoryResult};
use crate::repository::{DieselRepository, ImageListQuery, ImageReader, ImageWriter};

impl ImageReader for DieselRepository {
    fn search_similar(
        &self,
        embedding: &Embedding,
        top_k: TopK,
    ) -> RepositoryResult<Vec<SimilarImage>> {
        use crate::models::image::{ImageRow, into_similar_image};
        use crate::schema::image_embeddings;

        let mut conn = self.conn()?;
        let query = Vector::from(embedding.as_slice().to_vec());

        let rows = image_embeddings::table
            .select((
                ImageRow::as_select(),
                image_embeddings::embedding.cosine_distance(query.clone()),
            ))
            .order(image_embeddings::embedding.cosine_distance(query))
            .limit(top_k.get() as i64)
            .load::<(ImageRow, f64)>(&mut conn)?;

        rows.into_iter()
            .map(|(row, distance)| into_similar_image(row, distance).map_err(RepositoryError::from))
            .collect()
    }

    fn list_images(&self, query: ImageListQuery) -> RepositoryResult<Vec<ImageRecord>> {
        use crate::models::image::ImageRow;
        use crate::schema::image_embeddings;

        let mut conn = self.conn()?;

        let rows = image_embeddings::table
            .select(ImageRow::as_select())
            .order(image_embeddings::id.asc())
            .limit(query.limit as i64)
            .offset(query.offset as i64)
            .load::<ImageRow>(&mut conn)?;

        rows.into_iter()
            .map(|row| ImageRecord::try_from(row).map_err(RepositoryError::from))
            .collect()
    }
}

impl ImageWriter for DieselRepository {
    fn insert_embeddings(&self, records: &[NewImageEmbedding]) -> RepositoryResult<usize> {
        use crate::models::image::NewImageEmbedding as DbNewImageEmbedding;
        use crate::schema::image_embeddings;

        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let insertables: Vec<DbNewImageEmbedding> = records.iter().map(Into::into).collect();

        let affected = diesel::insert_into(image_embeddings::table)
            .values(&insertables)
            .on_conflict(image_embeddings::filepath)
            .do_nothing()
            .execute(&mut conn)?;

        Ok(affected)
    }
}
