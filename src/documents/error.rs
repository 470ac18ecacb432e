//! Error types for loading and chunking documents.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Unsupported file format '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Invalid chunking configuration: {0}")]
    Chunking(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract text from PDF {}: {reason}", path.display())]
    Pdf { path: PathBuf, reason: String },

    #[error("Failed to extract text from DOCX {}: {reason}", path.display())]
    Docx { path: PathBuf, reason: String },

    #[error("Document has no extractable content: {}", path.display())]
    EmptyDocument { path: PathBuf },
}

impl DocumentError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn pdf(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Pdf {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn docx(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Docx {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
