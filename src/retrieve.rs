//! Semantic search tool handed to the agent.
//!
//! The agent only ever sees [`SearchTool::search`]: a query goes in, a
//! plain-text block of numbered results comes out.

use std::sync::Arc;

use thiserror::Error;

use crate::documents::{Metadata, UNKNOWN_SOURCE};
use crate::store::{SearchHit, StoreError, VectorStore};

/// Returned by [`SearchTool::search`] when nothing matched.
pub const NO_RESULTS: &str = "No relevant documents found in the knowledge base.";

pub const TOOL_NAME: &str = "semantic_search";

pub const TOOL_DESCRIPTION: &str = "Search the knowledge base using semantic similarity. \
Use this tool when you need to find information related to concepts or topics. \
Input should be a natural language query. \
Returns the most relevant document chunks from the knowledge base.";

#[derive(Error, Debug)]
pub enum ToolExecutionError {
    #[error("Semantic search failed: {0}")]
    Search(#[from] StoreError),
}

/// Similarity search over a shared vector store.
#[derive(Clone)]
pub struct SearchTool {
    store: Arc<dyn VectorStore>,
    top_k: Option<usize>,
}

impl std::fmt::Debug for SearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchTool")
            .field("backend", &self.store.kind())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl SearchTool {
    /// `top_k` of `None` defers to the store's configured default.
    pub fn new(store: Arc<dyn VectorStore>, top_k: Option<usize>) -> Self {
        Self { store, top_k }
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Search and format the hits for the agent.
    pub async fn search(&self, query: &str) -> Result<String, ToolExecutionError> {
        tracing::info!(target: "retrieve", "semantic search for: {query}");

        let hits = self.search_raw(query, self.top_k, None).await.inspect_err(|e| {
            tracing::error!(target: "retrieve", "semantic search failed: {e}");
        })?;

        if hits.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        tracing::info!(target: "retrieve", "found {} relevant chunk(s)", hits.len());
        Ok(format_results(&hits))
    }

    /// Unformatted hits, most similar first.
    pub async fn search_raw(
        &self,
        query: &str,
        k: Option<usize>,
        filter: Option<&Metadata>,
    ) -> Result<Vec<SearchHit>, ToolExecutionError> {
        Ok(self.store.similarity_search(query, k, filter).await?)
    }
}

/// Numbered result blocks separated by `---` lines.
pub fn format_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Result {}:\nSource: {}\nContent: {}\n",
                i + 1,
                hit.source().unwrap_or(UNKNOWN_SOURCE),
                hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}
