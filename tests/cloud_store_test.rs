//! Cloud store against an in-process mock of the hosted index REST API.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use docrag::config::CloudStoreConfig;
use docrag::documents::Metadata;
use docrag::store::{CloudStore, DeleteOutcome, StoreError, VectorStore};
use docrag::vector::{MockEmbeddingGenerator, cosine_similarity};

const API_KEY: &str = "test-key";
const DIMENSION: usize = MockEmbeddingGenerator::DEFAULT_DIMENSION;

#[derive(Default)]
struct MockIndex {
    dimension: usize,
    /// Describe calls answered since creation; the index turns ready on the second.
    describes_since_create: usize,
    records: Vec<(String, Vec<f32>, Metadata)>,
}

#[derive(Default)]
struct MockState {
    host: String,
    index: Option<MockIndex>,
    creates: usize,
    upsert_calls: usize,
}

type Shared = Arc<Mutex<MockState>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("api-key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
        && headers.contains_key("x-pinecone-api-version")
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": "UNAUTHENTICATED", "message": "invalid api key" } })),
    )
}

fn matches_eq_filter(metadata: &Metadata, filter: Option<&Value>) -> bool {
    let Some(Value::Object(clauses)) = filter else {
        return true;
    };
    clauses
        .iter()
        .all(|(key, clause)| metadata.get(key) == clause.get("$eq"))
}

async fn describe_index(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut state = state.lock().unwrap();
    let host = state.host.clone();
    match state.index.as_mut() {
        Some(index) => {
            index.describes_since_create += 1;
            let ready = index.describes_since_create > 1;
            let phase = if ready { "Ready" } else { "Initializing" };
            (
                StatusCode::OK,
                Json(json!({
                    "name": name,
                    "dimension": index.dimension,
                    "metric": "cosine",
                    "host": host,
                    "status": { "ready": ready, "state": phase }
                })),
            )
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
    }
}

async fn create_index(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut state = state.lock().unwrap();
    assert_eq!(body["metric"], "cosine");
    assert!(body["spec"]["serverless"]["region"].is_string());
    state.creates += 1;
    state.index = Some(MockIndex {
        dimension: body["dimension"].as_u64().unwrap() as usize,
        ..Default::default()
    });
    (StatusCode::CREATED, Json(body))
}

async fn upsert(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut state = state.lock().unwrap();
    state.upsert_calls += 1;
    let vectors = body["vectors"].as_array().cloned().unwrap_or_default();
    assert!(vectors.len() <= 100, "upsert batch too large");

    let index = state.index.as_mut().unwrap();
    for vector in &vectors {
        let id = vector["id"].as_str().unwrap().to_string();
        let values: Vec<f32> = serde_json::from_value(vector["values"].clone()).unwrap();
        let metadata: Metadata = serde_json::from_value(vector["metadata"].clone()).unwrap();
        index.records.retain(|(existing, _, _)| *existing != id);
        index.records.push((id, values, metadata));
    }
    (StatusCode::OK, Json(json!({ "upsertedCount": vectors.len() })))
}

async fn query(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let state = state.lock().unwrap();
    let index = state.index.as_ref().unwrap();
    let vector: Vec<f32> = serde_json::from_value(body["vector"].clone()).unwrap();
    let top_k = body["topK"].as_u64().unwrap() as usize;
    let include_values = body["includeValues"].as_bool().unwrap_or(false);

    let mut scored: Vec<_> = index
        .records
        .iter()
        .filter(|(_, _, metadata)| matches_eq_filter(metadata, body.get("filter")))
        .map(|(id, values, metadata)| (cosine_similarity(&vector, values), id, values, metadata))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let matches: Vec<Value> = scored
        .into_iter()
        .take(top_k)
        .map(|(score, id, values, metadata)| {
            let mut m = json!({ "id": id, "score": score, "metadata": metadata });
            if include_values {
                m["values"] = json!(values);
            }
            m
        })
        .collect();
    (StatusCode::OK, Json(json!({ "matches": matches, "namespace": "" })))
}

async fn delete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut state = state.lock().unwrap();
    let index = state.index.as_mut().unwrap();
    if body["deleteAll"] == json!(true) {
        if index.records.is_empty() {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "namespace not found" })));
        }
        index.records.clear();
    } else {
        let filter = body.get("filter").cloned();
        index
            .records
            .retain(|(_, _, metadata)| !matches_eq_filter(metadata, filter.as_ref()));
    }
    (StatusCode::OK, Json(json!({})))
}

async fn stats(State(state): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let state = state.lock().unwrap();
    let count = state.index.as_ref().map(|i| i.records.len()).unwrap_or(0);
    let namespaces = if count == 0 {
        json!({})
    } else {
        json!({ "": { "vectorCount": count } })
    };
    (
        StatusCode::OK,
        Json(json!({ "namespaces": namespaces, "dimension": DIMENSION, "totalVectorCount": count })),
    )
}

/// Serve the mock on an ephemeral port; control and data plane share it.
async fn spawn_mock(existing_dimension: Option<usize>) -> (Shared, String) {
    let state: Shared = Arc::new(Mutex::new(MockState::default()));
    if let Some(dimension) = existing_dimension {
        state.lock().unwrap().index = Some(MockIndex {
            dimension,
            describes_since_create: 1,
            ..Default::default()
        });
    }

    let app = Router::new()
        .route("/indexes/{name}", get(describe_index))
        .route("/indexes", post(create_index))
        .route("/vectors/upsert", post(upsert))
        .route("/query", post(query))
        .route("/vectors/delete", post(delete))
        .route("/describe_index_stats", post(stats))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    state.lock().unwrap().host = url.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, url)
}

fn config(url: &str, api_key: &str) -> CloudStoreConfig {
    CloudStoreConfig {
        api_key: Some(api_key.to_string()),
        index_name: "kb-test".to_string(),
        control_plane_url: url.to_string(),
        ready_timeout_secs: 10,
        ..Default::default()
    }
}

async fn connect(url: &str) -> CloudStore {
    CloudStore::connect(
        &config(url, API_KEY),
        Arc::new(MockEmbeddingGenerator::with_dimension(DIMENSION)),
        5,
    )
    .await
    .unwrap()
}

fn source(path: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!(path));
    metadata
}

#[tokio::test]
async fn test_connect_creates_missing_index() {
    let (state, url) = spawn_mock(None).await;
    let store = connect(&url).await;

    {
        let state = state.lock().unwrap();
        assert_eq!(state.creates, 1);
        assert_eq!(state.index.as_ref().unwrap().dimension, DIMENSION);
    }

    let description = store.describe();
    assert_eq!(description.name, "kb-test");
    assert_eq!(description.dimension, DIMENSION);
    assert_eq!(description.location, url);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_existing_index_with_other_dimension_is_rejected() {
    let (state, url) = spawn_mock(Some(DIMENSION * 2)).await;
    let err = CloudStore::connect(
        &config(&url, API_KEY),
        Arc::new(MockEmbeddingGenerator::with_dimension(DIMENSION)),
        5,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        StoreError::DimensionMismatch {
            expected: 64,
            actual: 32
        }
    ));
    assert_eq!(state.lock().unwrap().creates, 0);
}

#[tokio::test]
async fn test_rejected_key_surfaces_status() {
    let (_state, url) = spawn_mock(Some(DIMENSION)).await;
    let err = CloudStore::connect(
        &config(&url, "wrong-key"),
        Arc::new(MockEmbeddingGenerator::with_dimension(DIMENSION)),
        5,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, StoreError::Api { status: 401, .. }));
}

#[tokio::test]
async fn test_add_search_and_inventory() {
    let (state, url) = spawn_mock(Some(DIMENSION)).await;
    let store = connect(&url).await;

    let texts: Vec<String> = (0..150)
        .map(|i| format!("filler record number {i} about nothing"))
        .chain(std::iter::once(
            "the quarterly revenue grew strongly in europe".to_string(),
        ))
        .collect();
    let metadatas: Vec<Metadata> = (0..151)
        .map(|i| source(if i < 100 { "a.txt" } else { "b.txt" }))
        .collect();

    let ids = store.add(texts, Some(metadatas), None).await.unwrap();
    assert_eq!(ids.len(), 151);
    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 151);
    assert_eq!(state.lock().unwrap().upsert_calls, 2);
    assert_eq!(store.count().await.unwrap(), 151);

    let hits = store
        .similarity_search("quarterly revenue europe", Some(3), None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].content, "the quarterly revenue grew strongly in europe");
    assert_eq!(hits[0].source(), Some("b.txt"));
    assert!(!hits[0].metadata.contains_key("text"));
    assert_eq!(hits[0].metadata["id"], json!(ids[150]));

    let filtered = store
        .similarity_search("quarterly revenue europe", Some(5), Some(&source("a.txt")))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 5);
    assert!(filtered.iter().all(|hit| hit.source() == Some("a.txt")));

    let inventory = store.get_all_documents().await.unwrap();
    assert_eq!(inventory.total_documents, 2);
    assert_eq!(inventory.total_chunks, 151);
    assert!(!inventory.may_be_incomplete);
    let b = inventory.document("b.txt").unwrap();
    assert_eq!(b.total_chunks, 51);
    assert!(b.chunks.iter().all(|c| c.embedding_dim == DIMENSION));
}

#[tokio::test]
async fn test_delete_by_source_and_reset() {
    let (_state, url) = spawn_mock(Some(DIMENSION)).await;
    let store = connect(&url).await;

    store
        .add(
            vec!["alpha one".into(), "alpha two".into(), "beta one".into()],
            Some(vec![source("a.txt"), source("a.txt"), source("b.txt")]),
            None,
        )
        .await
        .unwrap();

    let outcome = store.delete_by_source("a.txt").await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Unknown);
    assert_eq!(store.count().await.unwrap(), 1);

    store.reset().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);

    // A second reset hits an empty namespace
    store.reset().await.unwrap();
    assert!(store.get_all_documents().await.unwrap().documents.is_empty());
}

#[tokio::test]
async fn test_explicit_ids_are_upserted_in_place() {
    let (_state, url) = spawn_mock(Some(DIMENSION)).await;
    let store = connect(&url).await;

    let ids = vec!["doc-1".to_string()];
    store
        .add(vec!["first version".into()], None, Some(ids.clone()))
        .await
        .unwrap();
    let returned = store
        .add(vec!["second version".into()], None, Some(ids.clone()))
        .await
        .unwrap();

    assert_eq!(returned, ids);
    assert_eq!(store.count().await.unwrap(), 1);
    let hits = store.similarity_search("second version", Some(1), None).await.unwrap();
    assert_eq!(hits[0].content, "second version");
}

#[test]
fn test_mock_filter_helper() {
    let metadata = source("a.txt");
    let filter = json!({ "source": { "$eq": "a.txt" } });
    assert!(matches_eq_filter(&metadata, Some(&filter)));
    let other = json!({ "source": { "$eq": "b.txt" } });
    assert!(!matches_eq_filter(&metadata, Some(&other)));
    assert!(matches_eq_filter(&metadata, None));
}
