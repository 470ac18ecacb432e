use tantivy::TantivyError;
use tantivy::directory::error::OpenDirectoryError;
use thiserror::Error;

use crate::vector::VectorError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] VectorError),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] TantivyError),

    #[error("Directory error: {0}")]
    Directory(#[from] OpenDirectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vector index service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Index '{name}' was not ready after {waited_secs}s")]
    IndexNotReady { name: String, waited_secs: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;
