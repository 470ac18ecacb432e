//! Document ingestion and semantic retrieval for retrieval-augmented agents.
//!
//! Files are loaded ([`documents::DocumentLoader`]), split into overlapping
//! chunks ([`documents::RecursiveChunker`]), embedded and written to a
//! [`store::VectorStore`] by the [`ingest::Ingestor`]. Agents query the store
//! through [`retrieve::SearchTool`].

pub mod cli;
pub mod config;
pub mod documents;
pub mod ingest;
pub mod logging;
pub mod retrieve;
pub mod store;
pub mod vector;

pub use config::Settings;
pub use documents::{Chunk, ChunkingConfig, DocumentError, DocumentLoader, TextUnit};
pub use ingest::{IngestError, IngestReport, Ingestor};
pub use retrieve::{SearchTool, ToolExecutionError};
pub use store::{StoreError, VectorStore, open_store};
