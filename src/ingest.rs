//! Ingestion pipeline: load, chunk, store.
//!
//! A single file is written with one `add` call. A directory is loaded
//! tolerantly (unreadable files are skipped) and written in batches; once
//! writing starts, the first failed batch aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::Settings;
use crate::documents::{Chunk, ChunkingConfig, DocumentError, DocumentLoader, chunk_documents};
use crate::store::{StoreError, VectorStore};
use crate::{debug_event, log_event};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Progress updates during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    /// Text extraction finished.
    Loaded { text_units: usize },
    /// Chunking finished.
    Chunked { chunks: usize },
    /// A batch of chunks was written.
    BatchStored { current: usize, total: usize },
}

/// What one ingestion run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    /// File or directory that was ingested.
    pub source: PathBuf,
    pub text_units: usize,
    pub chunks: usize,
    /// Stored record ids, in chunk order.
    pub ids: Vec<String>,
    pub batches: usize,
}

/// Drives documents from disk into a vector store.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    loader: DocumentLoader,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("backend", &self.store.kind())
            .field("chunking", &self.chunking)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Ingestor {
    /// `batch_size` of zero is treated as one.
    pub fn new(store: Arc<dyn VectorStore>, chunking: ChunkingConfig, batch_size: usize) -> Self {
        Self {
            store,
            loader: DocumentLoader::new(),
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_settings(store: Arc<dyn VectorStore>, settings: &Settings) -> Self {
        Self::new(
            store,
            settings.chunking.clone(),
            settings.ingestion.batch_size,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Ingest one file with a single `add` call.
    pub async fn ingest_document(&self, path: &Path) -> Result<IngestReport, IngestError> {
        self.ingest_document_with_progress(path, |_| {}).await
    }

    pub async fn ingest_document_with_progress<F>(
        &self,
        path: &Path,
        mut progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(IngestProgress),
    {
        log_event!("ingest", "document", "{}", path.display());

        let units = self.loader.load_document(path)?;
        progress(IngestProgress::Loaded {
            text_units: units.len(),
        });

        let chunks = chunk_documents(&units, &self.chunking)?;
        progress(IngestProgress::Chunked {
            chunks: chunks.len(),
        });

        let total = chunks.len();
        let (ids, batches) = self.store_chunks(chunks, total.max(1), &mut progress).await?;

        self.log_collection_count().await;
        Ok(IngestReport {
            source: path.to_path_buf(),
            text_units: units.len(),
            chunks: total,
            ids,
            batches,
        })
    }

    /// Ingest every supported file under `dir`.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        self.ingest_directory_with_progress(dir, |_| {}).await
    }

    pub async fn ingest_directory_with_progress<F>(
        &self,
        dir: &Path,
        mut progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(IngestProgress),
    {
        log_event!("ingest", "directory", "{}", dir.display());

        let units = self.loader.load_directory(dir)?;
        progress(IngestProgress::Loaded {
            text_units: units.len(),
        });

        if units.is_empty() {
            tracing::warn!(target: "ingest", "no documents found in {}", dir.display());
            return Ok(IngestReport {
                source: dir.to_path_buf(),
                ..Default::default()
            });
        }

        let chunks = chunk_documents(&units, &self.chunking)?;
        progress(IngestProgress::Chunked {
            chunks: chunks.len(),
        });

        let total = chunks.len();
        let (ids, batches) = self
            .store_chunks(chunks, self.batch_size, &mut progress)
            .await?;

        log_event!(
            "ingest",
            "complete",
            "{} chunk(s) from {} text unit(s) in {batches} batch(es)",
            total,
            units.len()
        );
        self.log_collection_count().await;

        Ok(IngestReport {
            source: dir.to_path_buf(),
            text_units: units.len(),
            chunks: total,
            ids,
            batches,
        })
    }

    /// Ingest a file or a directory.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, IngestError> {
        self.ingest_path_with_progress(path, |_| {}).await
    }

    pub async fn ingest_path_with_progress<F>(
        &self,
        path: &Path,
        progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(IngestProgress),
    {
        if path.is_dir() {
            self.ingest_directory_with_progress(path, progress).await
        } else if path.is_file() {
            self.ingest_document_with_progress(path, progress).await
        } else {
            Err(DocumentError::NotFound {
                path: path.to_path_buf(),
            }
            .into())
        }
    }

    /// Write chunks in batches, returning the ids and the number of batches.
    async fn store_chunks<F>(
        &self,
        chunks: Vec<Chunk>,
        batch_size: usize,
        progress: &mut F,
    ) -> Result<(Vec<String>, usize), IngestError>
    where
        F: FnMut(IngestProgress),
    {
        if chunks.is_empty() {
            tracing::warn!(target: "ingest", "nothing to store: no chunks were produced");
            return Ok((Vec::new(), 0));
        }

        let total_batches = chunks.len().div_ceil(batch_size);
        let mut ids = Vec::with_capacity(chunks.len());
        let mut chunks = chunks.into_iter().peekable();
        let mut current = 0;

        while chunks.peek().is_some() {
            let (texts, metadatas): (Vec<String>, Vec<_>) = chunks
                .by_ref()
                .take(batch_size)
                .map(|chunk| (chunk.content, chunk.metadata))
                .unzip();
            current += 1;

            let mut batch_ids = self
                .store
                .add(texts, Some(metadatas), None)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        target: "ingest",
                        "batch {current}/{total_batches} failed: {e}"
                    );
                })?;
            debug_event!(
                "ingest",
                "batch stored",
                "{current}/{total_batches} ({} chunks)",
                batch_ids.len()
            );

            ids.append(&mut batch_ids);
            progress(IngestProgress::BatchStored {
                current,
                total: total_batches,
            });
        }

        Ok((ids, total_batches))
    }

    async fn log_collection_count(&self) {
        match self.store.count().await {
            Ok(count) => log_event!("ingest", "collection size", "{count} chunk(s)"),
            Err(e) => tracing::warn!(target: "ingest", "could not read collection size: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalStoreConfig;
    use crate::store::LocalStore;
    use crate::vector::MockEmbeddingGenerator;
    use std::fs;
    use tempfile::TempDir;

    fn local_store(temp_dir: &TempDir) -> Arc<dyn VectorStore> {
        let config = LocalStoreConfig {
            persist_directory: temp_dir.path().join("store"),
            collection_name: "ingest".to_string(),
            writer_heap_bytes: 20_000_000,
        };
        Arc::new(LocalStore::open(&config, Arc::new(MockEmbeddingGenerator::new()), 5).unwrap())
    }

    #[tokio::test]
    async fn test_directory_batches() {
        let temp_dir = TempDir::new().unwrap();
        let docs = temp_dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        for i in 0..5 {
            fs::write(docs.join(format!("doc{i}.txt")), format!("document number {i}")).unwrap();
        }

        let store = local_store(&temp_dir);
        let ingestor = Ingestor::new(store.clone(), ChunkingConfig::default(), 2);

        let mut events = Vec::new();
        let report = ingestor
            .ingest_directory_with_progress(&docs, |event| events.push(event))
            .await
            .unwrap();

        assert_eq!(report.text_units, 5);
        assert_eq!(report.chunks, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(report.ids.len(), 5);
        assert_eq!(store.count().await.unwrap(), 5);

        assert_eq!(events[0], IngestProgress::Loaded { text_units: 5 });
        assert_eq!(events[1], IngestProgress::Chunked { chunks: 5 });
        assert_eq!(
            events.last(),
            Some(&IngestProgress::BatchStored {
                current: 3,
                total: 3
            })
        );
    }

    #[tokio::test]
    async fn test_empty_directory_reports_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty");
        fs::create_dir(&empty).unwrap();

        let store = local_store(&temp_dir);
        let report = Ingestor::new(store.clone(), ChunkingConfig::default(), 100)
            .ingest_directory(&empty)
            .await
            .unwrap();

        assert_eq!(report.chunks, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(store.count().await.unwrap(), 0);

        assert_eq!(
            Ingestor::new(store, ChunkingConfig::default(), 0).batch_size(),
            1
        );
    }

    #[tokio::test]
    async fn test_errors_keep_their_kind() {
        let temp_dir = TempDir::new().unwrap();
        let store = local_store(&temp_dir);
        let ingestor = Ingestor::new(store, ChunkingConfig::default(), 100);

        let missing = ingestor
            .ingest_document(&temp_dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(
            missing,
            IngestError::Document(DocumentError::NotFound { .. })
        ));

        let odd = temp_dir.path().join("slides.pptx");
        fs::write(&odd, "not supported").unwrap();
        let unsupported = ingestor.ingest_path(&odd).await.unwrap_err();
        assert!(matches!(
            unsupported,
            IngestError::Document(DocumentError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_remaining_batches() {
        let temp_dir = TempDir::new().unwrap();
        let docs = temp_dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("a.txt"), "first healthy document").unwrap();
        fs::write(docs.join("b.txt"), "POISON pill document").unwrap();
        fs::write(docs.join("c.txt"), "third healthy document").unwrap();

        let config = LocalStoreConfig {
            persist_directory: temp_dir.path().join("store"),
            collection_name: "failing".to_string(),
            writer_heap_bytes: 20_000_000,
        };
        let store: Arc<dyn VectorStore> = Arc::new(
            LocalStore::open(
                &config,
                Arc::new(MockEmbeddingGenerator::new().failing_on("POISON")),
                5,
            )
            .unwrap(),
        );

        let err = Ingestor::new(store.clone(), ChunkingConfig::default(), 1)
            .ingest_directory(&docs)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::Embedding(_))));
        // the first batch stays written, the third never runs
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
