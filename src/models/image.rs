use diesel::prelude::*;
use pgvector::Vector;

use crate::domain::image::{
    ImageRecord as DomainImageRecord, NewImageEmbedding as DomainNewImageEmbedding,
    SimilarImage as DomainSimilarImage,
};
use crate::domain::types::{ImageId, TypeConstraintError};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::image_embeddings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
/// Diesel model for the listing columns of an indexed image.
pub struct ImageRow {
    pub id: i32,
    pub filename: String,
    pub filepath: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::image_embeddings)]
/// Insertable form of an image embedding.
pub struct NewImageEmbedding<'a> {
    pub filename: &'a str,
    pub filepath: &'a str,
    pub embedding: Vector,
}

impl TryFrom<ImageRow> for DomainImageRecord {
    type Error = TypeConstraintError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ImageId::new(row.id)?,
            filename: row.filename,
            filepath: row.filepath,
        })
    }
}

/// Converts a row paired with its cosine distance into a search hit.
pub fn into_similar_image(
    row: ImageRow,
    distance: f64,
) -> Result<DomainSimilarImage, TypeConstraintError> {
    Ok(DomainSimilarImage {
        id: ImageId::new(row.id)?,
        filename: row.filename,
        filepath: row.filepath,
        similarity: 1.0 - distance,
    })
}

impl<'a> From<&'a DomainNewImageEmbedding> for NewImageEmbedding<'a> {
    fn from(value: &'a DomainNewImageEmbedding) -> Self {
        Self {
            filename: value.filename.as_str(),
            filepath: value.filepath.as_str(),
            embedding: Vector::from(value.embedding.as_slice().to_vec()),
        }
    }
}
