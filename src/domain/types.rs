//! Strongly-typed value objects used by domain entities.
//!
//! These wrappers enforce basic invariants (positive identifiers, finite
//! embedding vectors, bounded result counts) so that once a value reaches
//! the domain layer it can be treated as trusted.
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when attempting to construct a constrained value object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeConstraintError {
    /// Provided identifier is zero or negative.
    #[error("id must be greater than zero")]
    NonPositiveId,
    /// Provided vector contained no values.
    #[error("embedding cannot be empty")]
    EmptyEmbedding,
    /// Provided vector contained `NaN` or infinite values.
    #[error("embedding contains non-finite values")]
    NonFiniteEmbedding,
    /// Provided vector length differs from the configured dimension.
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Requested number of results is out of range.
    #[error("top_k must be between 1 and {max}", max = TopK::MAX)]
    TopKOutOfRange,
}

/// Unique identifier for an indexed image.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ImageId(i32);

impl ImageId {
    /// Creates a new identifier ensuring it is greater than zero.
    pub fn new(value: i32) -> Result<Self, TypeConstraintError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(TypeConstraintError::NonPositiveId)
        }
    }

    /// Returns the raw `i32` backing this identifier.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl Display for ImageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for ImageId {
    type Error = TypeConstraintError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageId> for i32 {
    fn from(value: ImageId) -> Self {
        value.0
    }
}

/// Non-empty vector of finite `f32` values produced by an image model.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Validates that the vector is non-empty and contains finite values only.
    pub fn new(values: Vec<f32>) -> Result<Self, TypeConstraintError> {
        if values.is_empty() {
            return Err(TypeConstraintError::EmptyEmbedding);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TypeConstraintError::NonFiniteEmbedding);
        }
        Ok(Self(values))
    }

    /// Validates the vector and additionally checks its dimension.
    pub fn with_dimension(values: Vec<f32>, expected: usize) -> Result<Self, TypeConstraintError> {
        let embedding = Self::new(values)?;
        embedding.ensure_dimension(expected)?;
        Ok(embedding)
    }

    /// Fails when the vector length differs from `expected`.
    pub fn ensure_dimension(&self, expected: usize) -> Result<(), TypeConstraintError> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(TypeConstraintError::DimensionMismatch {
                expected,
                actual: self.0.len(),
            })
        }
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Deref for Embedding {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = TypeConstraintError;

    fn try_from(value: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Number of neighbours returned by a similarity search.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct TopK(usize);

impl TopK {
    pub const DEFAULT: usize = 5;
    pub const MAX: usize = 100;

    pub fn new(value: usize) -> Result<Self, TypeConstraintError> {
        if (1..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypeConstraintError::TopKOutOfRange)
        }
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for TopK {
    type Error = TypeConstraintError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_rejects_non_positive_values() {
        assert_eq!(ImageId::new(0), Err(TypeConstraintError::NonPositiveId));
        assert_eq!(ImageId::new(-3), Err(TypeConstraintError::NonPositiveId));
        assert_eq!(ImageId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn embedding_rejects_empty_and_non_finite_vectors() {
        assert_eq!(
            Embedding::new(vec![]),
            Err(TypeConstraintError::EmptyEmbedding)
        );
        assert_eq!(
            Embedding::new(vec![0.1, f32::NAN]),
            Err(TypeConstraintError::NonFiniteEmbedding)
        );
        assert_eq!(
            Embedding::new(vec![f32::INFINITY]),
            Err(TypeConstraintError::NonFiniteEmbedding)
        );
    }

    #[test]
    fn embedding_checks_dimension() {
        let err = Embedding::with_dimension(vec![0.0, 1.0], 3).unwrap_err();
        assert_eq!(
            err,
            TypeConstraintError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(err.to_string(), "embedding has 2 dimensions, expected 3");

        let ok = Embedding::with_dimension(vec![0.0, 1.0, 2.0], 3).unwrap();
        assert_eq!(ok.dimension(), 3);
        assert_eq!(ok.as_slice(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn top_k_bounds() {
        assert_eq!(TopK::new(0), Err(TypeConstraintError::TopKOutOfRange));
        assert_eq!(TopK::new(101), Err(TypeConstraintError::TopKOutOfRange));
        assert_eq!(TopK::new(1).unwrap().get(), 1);
        assert_eq!(TopK::new(100).unwrap().get(), 100);
        assert_eq!(TopK::default().get(), 5);
        assert_eq!(
            TypeConstraintError::TopKOutOfRange.to_string(),
            "top_k must be between 1 and 100"
        );
    }
}
