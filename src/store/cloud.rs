//! Hosted vector index reached over REST.
//!
//! Speaks the Pinecone-style API: a control plane for describing and creating
//! indexes, and a per-index data plane for upsert, query, delete and stats.
//! Chunk text travels in metadata under `text`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::{StoreError, StoreResult};
use super::{
    ChunkInfo, DeleteOutcome, DocumentInventory, SearchHit, StoreDescription, VectorStore,
    embed_all, prepare_add, resolve_k,
};
use crate::config::{CloudStoreConfig, VectorStoreKind};
use crate::documents::{Metadata, keys};
use crate::vector::EmbeddingGenerator;

/// Metadata key holding the chunk text.
pub const TEXT_KEY: &str = "text";

/// Largest upsert request sent in one call.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// `topK` used to list records for the inventory.
pub const INVENTORY_TOP_K: usize = 1000;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    namespaces: std::collections::HashMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: usize,
}

/// Vector store backed by a hosted index.
pub struct CloudStore {
    client: reqwest::Client,
    api_key: String,
    api_version: String,
    index_name: String,
    namespace: String,
    /// Data plane base URL, including the scheme.
    data_url: String,
    dimension: usize,
    embedder: Arc<dyn EmbeddingGenerator>,
    default_k: usize,
}

impl std::fmt::Debug for CloudStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStore")
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("data_url", &self.data_url)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl CloudStore {
    /// Connect to the configured index, creating it if it does not exist.
    ///
    /// A new index is created serverless with cosine metric and the embedding
    /// provider's dimension, then polled until ready.
    pub async fn connect(
        config: &CloudStoreConfig,
        embedder: Arc<dyn EmbeddingGenerator>,
        default_k: usize,
    ) -> StoreResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                StoreError::MissingCredentials(
                    "set vector_store.cloud.api_key or PINECONE_API_KEY".to_string(),
                )
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let control_url = config.control_plane_url.trim_end_matches('/').to_string();
        let dimension = embedder.dimension().get();

        let mut store = Self {
            client,
            api_key,
            api_version: config.api_version.clone(),
            index_name: config.index_name.clone(),
            namespace: config.namespace.clone(),
            data_url: String::new(),
            dimension,
            embedder,
            default_k: default_k.max(1),
        };

        let description = match store.describe_index(&control_url).await? {
            Some(description) => description,
            None => {
                store.create_index(&control_url, config).await?;
                store
                    .wait_until_ready(&control_url, Duration::from_secs(config.ready_timeout_secs))
                    .await?
            }
        };

        if description.dimension != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: description.dimension,
                actual: dimension,
            });
        }

        store.data_url = data_plane_url(&description.host);
        tracing::debug!(
            target: "store",
            "cloud index '{}' at {} (namespace '{}')",
            store.index_name,
            store.data_url,
            store.namespace
        );

        Ok(store)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
    }

    /// POST to the data plane and decode the JSON response.
    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> StoreResult<T> {
        let url = format!("{}{path}", self.data_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn describe_index(&self, control_url: &str) -> StoreResult<Option<IndexDescription>> {
        let url = format!("{control_url}/indexes/{}", self.index_name);
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn create_index(&self, control_url: &str, config: &CloudStoreConfig) -> StoreResult<()> {
        tracing::info!(
            target: "store",
            "creating cloud index '{}' ({} dimensions, {} {})",
            self.index_name,
            self.dimension,
            config.cloud,
            config.region
        );

        let body = json!({
            "name": self.index_name,
            "dimension": self.dimension,
            "metric": "cosine",
            "spec": {
                "serverless": {
                    "cloud": config.cloud,
                    "region": config.region,
                }
            }
        });

        let response = self
            .request(reqwest::Method::POST, &format!("{control_url}/indexes"))
            .json(&body)
            .send()
            .await?;

        // Another process may have created it in the meantime
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        decode::<Value>(response).await.map(|_| ())
    }

    async fn wait_until_ready(
        &self,
        control_url: &str,
        timeout: Duration,
    ) -> StoreResult<IndexDescription> {
        let started = Instant::now();

        loop {
            if let Some(description) = self.describe_index(control_url).await? {
                if description.status.ready {
                    return Ok(description);
                }
                tracing::debug!(
                    target: "store",
                    "waiting for index '{}' (state: {})",
                    self.index_name,
                    description.status.state
                );
            }

            if started.elapsed() >= timeout {
                return Err(StoreError::IndexNotReady {
                    name: self.index_name.clone(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_values: bool,
        filter: Option<Value>,
    ) -> StoreResult<Vec<QueryMatch>> {
        let request = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values,
            filter,
        };
        let response: QueryResponse = self.post("/query", &serde_json::to_value(request)?).await?;
        Ok(response.matches)
    }
}

#[async_trait]
impl VectorStore for CloudStore {
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
        let ids = ids.unwrap_or_else(|| {
            texts
                .iter()
                .map(|_| uuid::Uuid::new_v4().to_string())
                .collect()
        });

        let records: Vec<Metadata> = texts
            .iter()
            .zip(metadatas)
            .zip(&ids)
            .map(|((text, mut metadata), id)| {
                // The service rejects null metadata values
                metadata.retain(|_, value| !value.is_null());
                metadata.insert(TEXT_KEY.to_string(), json!(text));
                metadata.insert(keys::ID.to_string(), json!(id));
                metadata
            })
            .collect();

        let total_batches = ids.len().div_ceil(UPSERT_BATCH_SIZE);
        for (batch, start) in (0..ids.len()).step_by(UPSERT_BATCH_SIZE).enumerate() {
            let end = (start + UPSERT_BATCH_SIZE).min(ids.len());
            let vectors: Vec<UpsertVector<'_>> = (start..end)
                .map(|i| UpsertVector {
                    id: &ids[i],
                    values: &embeddings[i],
                    metadata: &records[i],
                })
                .collect();

            let body = json!({
                "vectors": vectors,
                "namespace": self.namespace,
            });
            let _: Value = self.post("/vectors/upsert", &body).await?;

            tracing::debug!(
                target: "store",
                "upserted batch {}/{total_batches} ({} vectors)",
                batch + 1,
                end - start
            );
        }

        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: Option<&Metadata>,
    ) -> StoreResult<Vec<SearchHit>> {
        let k = resolve_k(k, self.default_k);
        let vector = embed_all(self.embedder.as_ref(), &[query.to_string()])?
            .into_iter()
            .next()
            .unwrap_or_default();

        let matches = self
            .query(&vector, k, false, filter.and_then(translate_filter))
            .await?;

        Ok(matches
            .into_iter()
            .map(|m| {
                let (content, metadata) = split_text(m.metadata.unwrap_or_default());
                SearchHit {
                    content,
                    metadata,
                    score: m.score,
                }
            })
            .collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        let url = format!("{}/describe_index_stats", self.data_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({}))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let stats: IndexStats = decode(response).await?;
        if self.namespace.is_empty() && stats.namespaces.is_empty() {
            return Ok(stats.total_vector_count);
        }
        Ok(stats
            .namespaces
            .get(&self.namespace)
            .map(|ns| ns.vector_count)
            .unwrap_or(0))
    }

    async fn reset(&self) -> StoreResult<()> {
        let url = format!("{}/vectors/delete", self.data_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "deleteAll": true, "namespace": self.namespace }))
            .send()
            .await?;

        // Deleting an empty namespace reports 404
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            decode::<Value>(response).await?;
        }

        tracing::info!(
            target: "store",
            "reset cloud index '{}' namespace '{}'",
            self.index_name,
            self.namespace
        );
        Ok(())
    }

    async fn get_all_documents(&self) -> StoreResult<DocumentInventory> {
        let total = self.count().await?;
        if total == 0 {
            return Ok(DocumentInventory::default());
        }

        // A broad query is the only listing primitive for every index type
        let probe = vec![1.0 / (self.dimension as f32).sqrt(); self.dimension];
        let matches = self.query(&probe, INVENTORY_TOP_K, true, None).await?;
        let collected = matches.len();

        let chunks = matches.into_iter().map(|m| {
            let (content, metadata) = split_text(m.metadata.unwrap_or_default());
            ChunkInfo {
                id: m.id,
                content_length: content.chars().count(),
                content,
                metadata,
                embedding_dim: m.values.len(),
            }
        });

        let may_be_incomplete = collected < total;
        if may_be_incomplete {
            tracing::warn!(
                target: "store",
                "inventory lists {collected} of {total} records in index '{}'",
                self.index_name
            );
        }

        Ok(DocumentInventory::from_chunks(chunks, may_be_incomplete))
    }

    async fn delete_by_source(&self, source: &str) -> StoreResult<DeleteOutcome> {
        let mut filter = Metadata::new();
        filter.insert(keys::SOURCE.to_string(), json!(source));
        let body = json!({
            "filter": translate_filter(&filter),
            "namespace": self.namespace,
        });
        let _: Value = self.post("/vectors/delete", &body).await?;

        tracing::info!(target: "store", "requested deletion of records with source {source}");
        Ok(DeleteOutcome::Unknown)
    }

    fn kind(&self) -> VectorStoreKind {
        VectorStoreKind::Cloud
    }

    fn describe(&self) -> StoreDescription {
        StoreDescription {
            backend: VectorStoreKind::Cloud,
            name: self.index_name.clone(),
            location: self.data_url.clone(),
            dimension: self.dimension,
            embedding_model: self.embedder.model_name().to_string(),
        }
    }
}

/// Decode a successful JSON response or turn the status and body into an error.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(StoreError::Api {
            status: status.as_u16(),
            body,
        });
    }

    // Some endpoints answer with an empty body
    let body = if body.trim().is_empty() { "{}" } else { &body };
    Ok(serde_json::from_str(body)?)
}

/// Index hosts are reported without a scheme.
fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// `{"k": v}` becomes `{"k": {"$eq": v}}`; keys are ANDed.
fn translate_filter(filter: &Metadata) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }
    let clauses: serde_json::Map<String, Value> = filter
        .iter()
        .map(|(key, value)| (key.clone(), json!({ "$eq": value })))
        .collect();
    Some(Value::Object(clauses))
}

/// Separate the stored text from the rest of the metadata.
fn split_text(mut metadata: Metadata) -> (String, Metadata) {
    let content = match metadata.remove(TEXT_KEY) {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    (content, metadata)
}
