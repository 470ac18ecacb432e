//! Document chunking.
//!
//! Provides the `Chunker` trait and the recursive character splitter used for
//! every loaded format.

use std::collections::VecDeque;

use serde_json::json;

use super::config::ChunkingConfig;
use super::error::DocumentError;
use super::types::{Chunk, TextUnit, keys};

/// Separators tried in order, coarsest first. The empty separator splits
/// between characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Trait for document chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split one text into trimmed, non-empty pieces.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split every unit, numbering chunks across the whole call.
    ///
    /// Each chunk copies its unit's metadata and adds `chunk_id` and
    /// `chunk_size`. Chunks never span two units.
    fn chunk_units(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for unit in units {
            for content in self.split_text(&unit.content) {
                let mut metadata = unit.metadata.clone();
                metadata.insert(keys::CHUNK_ID.to_string(), json!(chunks.len()));
                metadata.insert(
                    keys::CHUNK_SIZE.to_string(),
                    json!(content.chars().count()),
                );
                chunks.push(Chunk { content, metadata });
            }
        }

        chunks
    }
}

/// Recursive character splitter.
///
/// Algorithm:
/// 1. Pick the first separator that occurs in the text
/// 2. Split on it, keeping the separator at the start of the following piece
/// 3. Greedily merge pieces shorter than `chunk_size`, carrying up to
///    `chunk_overlap` characters of trailing pieces into the next chunk
/// 4. Recurse into pieces of `chunk_size` or more with the finer separators
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker with the default separators.
    pub fn new(config: ChunkingConfig) -> Result<Self, DocumentError> {
        config.validate().map_err(DocumentError::Chunking)?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Fall back to the last separator when none of the others occur
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Greedy merge with overlap. Separators already live inside the pieces.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let chunk_overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > chunk_size {
                if total > chunk_size {
                    tracing::debug!(
                        target: "chunker",
                        "created a chunk of {total} chars, longer than {chunk_size}"
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current) {
                        docs.push(doc);
                    }

                    while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                        match current.pop_front() {
                            Some((_, front_len)) => total -= front_len,
                            None => break,
                        }
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }

        docs
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }
}

/// Chunk loaded units with the given configuration.
pub fn chunk_documents(
    units: &[TextUnit],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, DocumentError> {
    let chunker = RecursiveChunker::new(config.clone())?;
    let chunks = chunker.chunk_units(units);

    tracing::debug!(
        target: "chunker",
        "split {} unit(s) into {} chunk(s) (size {}, overlap {})",
        units.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );
    Ok(chunks)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_pieces(pieces: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = pieces.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split `text` on `separator`, attaching each separator to the start of the
/// piece that follows it. The empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
