//! Document loading and chunking.
//!
//! This module provides:
//! - Format detection and text extraction for PDF, DOCX and TXT files
//! - Tolerant recursive directory loading
//! - Recursive character chunking with overlap

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod types;

pub use chunker::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker, chunk_documents};
pub use config::ChunkingConfig;
pub use error::DocumentError;
pub use loader::{DocumentLoader, FileFormat, extract_docx_text};
pub use types::{Chunk, Metadata, TextUnit, UNKNOWN_SOURCE, keys, preview, source_of};
