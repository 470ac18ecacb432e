//! Vector store abstraction and its two backends.
//!
//! Callers hold an `Arc<dyn VectorStore>` built once by [`open_store`]:
//! - [`LocalStore`]: tantivy index on disk, exact cosine scan
//! - [`CloudStore`]: hosted index reached over REST
//!
//! Records are grouped by `metadata.source` for deletion and inventory.

pub mod cloud;
pub mod error;
pub mod local;
pub mod schema;

pub use cloud::CloudStore;
pub use error::{StoreError, StoreResult};
pub use local::LocalStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{Settings, VectorStoreKind};
use crate::documents::{Metadata, UNKNOWN_SOURCE, source_of};
use crate::vector::EmbeddingGenerator;

/// One similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity, higher is more similar.
    pub score: f32,
}

impl SearchHit {
    pub fn source(&self) -> Option<&str> {
        source_of(&self.metadata)
    }
}

/// A stored chunk as reported by [`VectorStore::get_all_documents`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkInfo {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub embedding_dim: usize,
    /// Length of `content` in characters.
    pub content_length: usize,
}

/// All chunks sharing one `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub source: String,
    pub chunks: Vec<ChunkInfo>,
    pub total_chunks: usize,
}

/// Stored records grouped by source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentInventory {
    pub documents: Vec<DocumentEntry>,
    pub total_documents: usize,
    pub total_chunks: usize,
    /// Set when the backend could only list part of the records.
    pub may_be_incomplete: bool,
}

impl DocumentInventory {
    /// Group chunks by `metadata.source`, sorted by source.
    ///
    /// Chunks without a source are grouped under `"Unknown"`. Chunk order
    /// within a group follows the input order.
    pub fn from_chunks(
        chunks: impl IntoIterator<Item = ChunkInfo>,
        may_be_incomplete: bool,
    ) -> Self {
        let mut grouped: BTreeMap<String, Vec<ChunkInfo>> = BTreeMap::new();
        for chunk in chunks {
            let source = source_of(&chunk.metadata)
                .unwrap_or(UNKNOWN_SOURCE)
                .to_string();
            grouped.entry(source).or_default().push(chunk);
        }

        let documents: Vec<DocumentEntry> = grouped
            .into_iter()
            .map(|(source, chunks)| DocumentEntry {
                source,
                total_chunks: chunks.len(),
                chunks,
            })
            .collect();

        Self {
            total_documents: documents.len(),
            total_chunks: documents.iter().map(|d| d.total_chunks).sum(),
            documents,
            may_be_incomplete,
        }
    }

    pub fn document(&self, source: &str) -> Option<&DocumentEntry> {
        self.documents.iter().find(|d| d.source == source)
    }
}

/// Result of [`VectorStore::delete_by_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "count")]
pub enum DeleteOutcome {
    /// Exactly this many records were removed.
    Exact(usize),
    /// Deletion was issued but the backend does not report a count.
    Unknown,
}

impl std::fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteOutcome::Exact(n) => write!(f, "{n} chunk(s) deleted"),
            DeleteOutcome::Unknown => f.write_str("deletion requested (count not reported)"),
        }
    }
}

/// Static facts about an open store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDescription {
    pub backend: VectorStoreKind,
    /// Collection or index name.
    pub name: String,
    /// Directory or endpoint.
    pub location: String,
    pub dimension: usize,
    pub embedding_model: String,
}

/// Persistent nearest-neighbour index over embedded text.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and persist every text, returning one id per text in input order.
    ///
    /// `metadatas` and `ids`, when given, must have the same length as
    /// `texts`. Records written before a mid-batch failure stay written.
    async fn add(
        &self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> StoreResult<Vec<String>>;

    /// Up to `k` most similar records, most similar first.
    ///
    /// `k` of `None` or `0` uses the store's configured default. Every key
    /// in `filter` must match the record's metadata exactly.
    async fn similarity_search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: Option<&Metadata>,
    ) -> StoreResult<Vec<SearchHit>>;

    /// Number of stored records.
    async fn count(&self) -> StoreResult<usize>;

    /// Delete every record and leave the store ready for writes.
    async fn reset(&self) -> StoreResult<()>;

    /// Every stored record grouped by source.
    async fn get_all_documents(&self) -> StoreResult<DocumentInventory>;

    /// Delete every record whose `metadata.source` equals `source`.
    async fn delete_by_source(&self, source: &str) -> StoreResult<DeleteOutcome>;

    fn kind(&self) -> VectorStoreKind;

    fn describe(&self) -> StoreDescription;
}

/// Build the configured backend.
pub async fn open_store(
    settings: &Settings,
    embedder: Arc<dyn EmbeddingGenerator>,
) -> StoreResult<Arc<dyn VectorStore>> {
    let default_k = settings.retrieval.top_k;

    let store: Arc<dyn VectorStore> = match settings.vector_store.kind {
        VectorStoreKind::Local => Arc::new(LocalStore::open(
            &settings.vector_store.local,
            embedder,
            default_k,
        )?),
        VectorStoreKind::Cloud => Arc::new(
            CloudStore::connect(&settings.vector_store.cloud, embedder, default_k).await?,
        ),
    };

    let description = store.describe();
    tracing::info!(
        target: "store",
        "opened {} store '{}' at {} ({} dimensions)",
        description.backend,
        description.name,
        description.location,
        description.dimension
    );

    Ok(store)
}

/// Validate `add` arguments, filling in empty metadata when none was given.
pub(crate) fn prepare_add(
    texts: &[String],
    metadatas: Option<Vec<Metadata>>,
    ids: Option<&[String]>,
) -> StoreResult<Vec<Metadata>> {
    let metadatas = match metadatas {
        Some(metadatas) if metadatas.len() != texts.len() => {
            return Err(StoreError::InvalidInput(format!(
                "got {} metadata entries for {} texts",
                metadatas.len(),
                texts.len()
            )));
        }
        Some(metadatas) => metadatas,
        None => vec![Metadata::new(); texts.len()],
    };

    if let Some(ids) = ids {
        if ids.len() != texts.len() {
            return Err(StoreError::InvalidInput(format!(
                "got {} ids for {} texts",
                ids.len(),
                texts.len()
            )));
        }
        if ids.iter().any(|id| id.is_empty()) {
            return Err(StoreError::InvalidInput("ids must not be empty".to_string()));
        }
    }

    Ok(metadatas)
}

/// `k` of `None` or zero falls back to `default_k`.
pub(crate) fn resolve_k(k: Option<usize>, default_k: usize) -> usize {
    match k {
        Some(k) if k > 0 => k,
        _ => default_k,
    }
}

/// True when every key of `filter` is present in `metadata` with an equal value.
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Embed `texts` and check the vectors against the generator's dimension.
pub(crate) fn embed_all(
    embedder: &dyn EmbeddingGenerator,
    texts: &[String],
) -> StoreResult<Vec<Vec<f32>>> {
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let embeddings = embedder.generate_embeddings(&refs)?;

    if embeddings.len() != texts.len() {
        return Err(StoreError::InvalidInput(format!(
            "embedding provider returned {} vectors for {} texts",
            embeddings.len(),
            texts.len()
        )));
    }

    let dimension = embedder.dimension();
    for embedding in &embeddings {
        dimension.validate(embedding)?;
    }

    Ok(embeddings)
}
