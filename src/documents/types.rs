//! Core types for loaded and chunked text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to every text unit, chunk and stored record.
pub type Metadata = serde_json::Map<String, Value>;

/// Well-known metadata keys.
pub mod keys {
    /// Path of the originating file, as given to the loader.
    pub const SOURCE: &str = "source";
    /// Lowercase extension with the leading dot (`.pdf`).
    pub const FILE_TYPE: &str = "file_type";
    /// 0-based page index (PDF only).
    pub const PAGE: &str = "page";
    /// Page count of the originating PDF.
    pub const TOTAL_PAGES: &str = "total_pages";
    /// 0-based position of a chunk within one chunking call.
    pub const CHUNK_ID: &str = "chunk_id";
    /// Character count of a chunk.
    pub const CHUNK_SIZE: &str = "chunk_size";
    /// Record id (cloud records carry it in metadata too).
    pub const ID: &str = "id";
}

/// Placeholder used wherever a record has no `source`.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Read the `source` key of a metadata map.
pub fn source_of(metadata: &Metadata) -> Option<&str> {
    metadata.get(keys::SOURCE).and_then(Value::as_str)
}

/// A unit of extracted text: a whole TXT/DOCX file or one PDF page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub content: String,
    pub metadata: Metadata,
}

impl TextUnit {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        source_of(&self.metadata)
    }
}

/// A piece of a [`TextUnit`] sized for embedding.
///
/// Metadata is a copy of the originating unit's metadata plus
/// `chunk_id` and `chunk_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        source_of(&self.metadata)
    }

    pub fn chunk_id(&self) -> Option<u64> {
        self.metadata.get(keys::CHUNK_ID).and_then(Value::as_u64)
    }

    /// Character count of the content.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// Get a preview of the content (first N characters).
    pub fn preview(&self, max_chars: usize) -> &str {
        preview(&self.content, max_chars)
    }
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
