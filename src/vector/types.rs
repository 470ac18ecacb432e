//! Core vector types shared by the embedding generators and the stores.

use std::num::NonZeroU32;
use thiserror::Error;

/// Errors from embedding generation.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embedding: {0}")]
    Embedding(String),

    #[error("Unknown embedding model '{0}'")]
    UnknownModel(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Dimension of the vectors produced by an embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(NonZeroU32);

impl VectorDimension {
    /// Create a dimension, returning None for zero.
    pub fn new(value: usize) -> Option<Self> {
        u32::try_from(value).ok().and_then(NonZeroU32::new).map(Self)
    }

    pub fn get(&self) -> usize {
        self.0.get() as usize
    }

    /// Check a produced vector against this dimension.
    pub fn validate(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.get() {
            return Err(VectorError::DimensionMismatch {
                expected: self.get(),
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
