//! Disk-backed vector store.
//!
//! Records live in a tantivy index under `<persist_directory>/<collection>/`.
//! Search embeds the query and scans every candidate with exact cosine
//! similarity; the `source` field is indexed so source filters and
//! delete-by-source don't need a scan.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, DocSetCollector};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{
    DocAddress, Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, Searcher,
    TantivyDocument as Document, Term,
};

use super::error::{StoreError, StoreResult};
use super::schema::{RecordSchema, decode_embedding, encode_embedding};
use super::{
    ChunkInfo, DeleteOutcome, DocumentInventory, SearchHit, StoreDescription, VectorStore,
    embed_all, matches_filter, prepare_add, resolve_k,
};
use crate::config::{LocalStoreConfig, VectorStoreKind};
use crate::documents::{Metadata, keys, source_of};
use crate::vector::{EmbeddingGenerator, cosine_similarity};

const INDEX_DIR: &str = "index";
const STATE_FILE: &str = "state.json";

/// Persisted counters for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalState {
    next_seq: u64,
    /// Dimension of the first vectors written, checked on every add and search.
    dimension: Option<usize>,
    /// Bumped by every reset; selects the live index directory.
    #[serde(default)]
    generation: u64,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            next_seq: 1,
            dimension: None,
            generation: 0,
        }
    }
}

impl LocalState {
    fn index_dir(&self) -> String {
        match self.generation {
            0 => INDEX_DIR.to_string(),
            generation => format!("{INDEX_DIR}-{generation}"),
        }
    }

    fn check_dimension(&self, actual: usize) -> StoreResult<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(StoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// An open tantivy index with its reader and lazily created writer.
struct Collection {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter<Document>>>,
}

impl Collection {
    fn open(index_path: &Path, schema: tantivy::schema::Schema) -> StoreResult<Self> {
        std::fs::create_dir_all(index_path)?;

        let existing = index_path.join("meta.json").exists();
        let index = if existing {
            Index::open_in_dir(index_path)?
        } else {
            let dir = MmapDirectory::open(index_path)?;
            Index::create(dir, schema, IndexSettings::default())?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        if existing {
            reader.reload()?;
        }

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
        })
    }

    /// Run `f` with the writer, creating it on first use, then commit and reload.
    fn write<T>(
        &self,
        heap_size: usize,
        f: impl FnOnce(&mut IndexWriter<Document>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut writer_guard = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;

        if writer_guard.is_none() {
            *writer_guard = Some(self.index.writer(heap_size)?);
        }
        let writer = writer_guard.as_mut().ok_or(StoreError::LockPoisoned)?;

        let result = f(writer)?;
        writer.commit()?;
        self.reader.reload()?;

        Ok(result)
    }

    /// Release the writer and its lock file.
    fn close_writer(&self) -> StoreResult<()> {
        let mut writer_guard = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(writer) = writer_guard.take() {
            writer.wait_merging_threads()?;
        }
        Ok(())
    }
}

/// A decoded stored record.
struct StoredRecord {
    id: String,
    seq: u64,
    content: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// Local persistent vector store.
pub struct LocalStore {
    /// `<persist_directory>/<collection_name>`
    root: PathBuf,
    collection_name: String,
    schema: RecordSchema,
    tantivy_schema: tantivy::schema::Schema,
    collection: RwLock<Arc<Collection>>,
    state: Mutex<LocalState>,
    embedder: Arc<dyn EmbeddingGenerator>,
    default_k: usize,
    heap_size: usize,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("root", &self.root)
            .field("collection_name", &self.collection_name)
            .field("default_k", &self.default_k)
            .finish()
    }
}

impl LocalStore {
    /// Open or create the configured collection.
    pub fn open(
        config: &LocalStoreConfig,
        embedder: Arc<dyn EmbeddingGenerator>,
        default_k: usize,
    ) -> StoreResult<Self> {
        if config.collection_name.trim().is_empty()
            || config.collection_name.contains(['/', '\\'])
        {
            return Err(StoreError::InvalidInput(format!(
                "invalid collection name '{}'",
                config.collection_name
            )));
        }

        let root = config.persist_directory.join(&config.collection_name);
        std::fs::create_dir_all(&root)?;

        let (tantivy_schema, schema) = RecordSchema::build();
        let state = Self::load_state(&root)?;
        let collection = Collection::open(&root.join(state.index_dir()), tantivy_schema.clone())?;

        tracing::debug!(
            target: "store",
            "local collection '{}' at {} (next seq {})",
            config.collection_name,
            root.display(),
            state.next_seq
        );

        Ok(Self {
            root,
            collection_name: config.collection_name.clone(),
            schema,
            tantivy_schema,
            collection: RwLock::new(Arc::new(collection)),
            state: Mutex::new(state),
            embedder,
            default_k: default_k.max(1),
            heap_size: config.writer_heap_bytes,
        })
    }

    /// Directory holding this collection.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn current(&self) -> Arc<Collection> {
        self.collection.read().clone()
    }

    fn load_state(root: &Path) -> StoreResult<LocalState> {
        let state_path = root.join(STATE_FILE);
        if !state_path.exists() {
            return Ok(LocalState::default());
        }
        let content = std::fs::read_to_string(state_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_state(&self, state: &LocalState) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(self.root.join(STATE_FILE), content)?;
        Ok(())
    }

    /// Reserve `count` sequence numbers and fix the collection dimension.
    fn reserve(&self, count: usize, dimension: usize) -> StoreResult<u64> {
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;

        state.check_dimension(dimension)?;
        state.dimension.get_or_insert(dimension);

        let first = state.next_seq;
        state.next_seq += count as u64;
        self.save_state(&state)?;
        Ok(first)
    }

    fn source_query(&self, source: &str) -> TermQuery {
        let term = Term::from_field_text(self.schema.source, source);
        TermQuery::new(term, IndexRecordOption::Basic)
    }

    fn read_record(&self, searcher: &Searcher, address: DocAddress) -> StoreResult<StoredRecord> {
        let doc: Document = searcher.doc(address)?;

        let text = |field: tantivy::schema::Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let metadata: Metadata = match doc.get_first(self.schema.metadata).and_then(|v| v.as_str())
        {
            Some(json) => serde_json::from_str(json)?,
            None => Metadata::new(),
        };

        Ok(StoredRecord {
            id: text(self.schema.record_id),
            seq: doc
                .get_first(self.schema.seq)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            content: text(self.schema.content),
            metadata,
            embedding: doc
                .get_first(self.schema.embedding)
                .and_then(|v| v.as_bytes())
                .map(decode_embedding)
                .unwrap_or_default(),
        })
    }

    /// Every record matching `query`, in insertion order.
    fn collect_records(&self, query: &dyn Query) -> StoreResult<Vec<StoredRecord>> {
        let searcher = self.current().reader.searcher();
        let addresses = searcher.search(query, &DocSetCollector)?;

        let mut records = addresses
            .into_iter()
            .map(|address| self.read_record(&searcher, address))
            .collect::<StoreResult<Vec<_>>>()?;
        records.sort_by_key(|record| record.seq);

        Ok(records)
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn add(
        &self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> StoreResult<Vec<String>> {
        let metadatas = prepare_add(&texts, metadatas, ids.as_deref())?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = embed_all(self.embedder.as_ref(), &texts)?;
        let first_seq = self.reserve(texts.len(), self.embedder.dimension().get())?;
        let ids = ids.unwrap_or_else(|| {
            (0..texts.len() as u64)
                .map(|offset| format!("rec-{}", first_seq + offset))
                .collect()
        });

        let indexed_at = chrono::Utc::now().timestamp().max(0) as u64;
        let collection = self.current();

        collection.write(self.heap_size, |writer| {
            for (offset, ((text, metadata), embedding)) in
                texts.iter().zip(&metadatas).zip(&embeddings).enumerate()
            {
                let id = &ids[offset];
                // Re-adding an id replaces the earlier record
                writer.delete_term(Term::from_field_text(self.schema.record_id, id));

                let mut doc = Document::new();
                doc.add_text(self.schema.record_id, id);
                doc.add_u64(self.schema.seq, first_seq + offset as u64);
                if let Some(source) = source_of(metadata) {
                    doc.add_text(self.schema.source, source);
                }
                doc.add_text(self.schema.content, text);
                doc.add_text(self.schema.metadata, serde_json::to_string(metadata)?);
                doc.add_bytes(self.schema.embedding, encode_embedding(embedding).as_slice());
                doc.add_u64(self.schema.indexed_at, indexed_at);

                writer.add_document(doc)?;
            }
            Ok(())
        })?;

        tracing::debug!(
            target: "store",
            "added {} record(s) to '{}'",
            ids.len(),
            self.collection_name
        );
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: Option<&Metadata>,
    ) -> StoreResult<Vec<SearchHit>> {
        let k = resolve_k(k, self.default_k);

        if self.current().reader.searcher().num_docs() == 0 {
            return Ok(Vec::new());
        }

        // Vectors from another model would all score zero
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .check_dimension(self.embedder.dimension().get())?;

        let query_embedding = embed_all(self.embedder.as_ref(), &[query.to_string()])?
            .into_iter()
            .next()
            .unwrap_or_default();

        let candidates = match filter.and_then(|f| f.get(keys::SOURCE)).and_then(|v| v.as_str()) {
            Some(source) => self.collect_records(&self.source_query(source))?,
            None => self.collect_records(&AllQuery)?,
        };

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|record| filter.is_none_or(|f| matches_filter(&record.metadata, f)))
            .map(|record| SearchHit {
                score: cosine_similarity(&query_embedding, &record.embedding),
                content: record.content,
                metadata: record.metadata,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        tracing::debug!(
            target: "store",
            "similarity search returned {} hit(s) (k = {k})",
            hits.len()
        );
        Ok(hits)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.current().reader.searcher().num_docs() as usize)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut handle = self.collection.write();
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;

        // The old collection stays live until the fresh one is open and recorded
        let next = LocalState {
            generation: state.generation + 1,
            ..LocalState::default()
        };
        let next_path = self.root.join(next.index_dir());
        if next_path.exists() {
            std::fs::remove_dir_all(&next_path)?;
        }
        let fresh = Collection::open(&next_path, self.tantivy_schema.clone())?;

        handle.close_writer()?;
        self.save_state(&next)?;

        let old_path = self.root.join(state.index_dir());
        *state = next;
        *handle = Arc::new(fresh);

        if let Err(e) = std::fs::remove_dir_all(&old_path) {
            tracing::warn!(
                target: "store",
                "could not remove old index {}: {e}",
                old_path.display()
            );
        }

        tracing::info!(target: "store", "reset local collection '{}'", self.collection_name);
        Ok(())
    }

    async fn get_all_documents(&self) -> StoreResult<DocumentInventory> {
        let chunks = self
            .collect_records(&AllQuery)?
            .into_iter()
            .map(|record| ChunkInfo {
                content_length: record.content.chars().count(),
                embedding_dim: record.embedding.len(),
                id: record.id,
                content: record.content,
                metadata: record.metadata,
            });

        Ok(DocumentInventory::from_chunks(chunks, false))
    }

    async fn delete_by_source(&self, source: &str) -> StoreResult<DeleteOutcome> {
        let collection = self.current();
        let query = self.source_query(source);
        let matching = collection.reader.searcher().search(&query, &Count)?;

        if matching > 0 {
            collection.write(self.heap_size, |writer| {
                writer.delete_term(Term::from_field_text(self.schema.source, source));
                Ok(())
            })?;
        }

        tracing::info!(
            target: "store",
            "deleted {matching} record(s) with source {source}"
        );
        Ok(DeleteOutcome::Exact(matching))
    }

    fn kind(&self) -> VectorStoreKind {
        VectorStoreKind::Local
    }

    fn describe(&self) -> StoreDescription {
        StoreDescription {
            backend: VectorStoreKind::Local,
            name: self.collection_name.clone(),
            location: self.root.display().to_string(),
            dimension: self.embedder.dimension().get(),
            embedding_model: self.embedder.model_name().to_string(),
        }
    }
}
