//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod admin;
pub mod ingest;
pub mod init;
pub mod search;
pub mod store;

use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::store::{VectorStore, open_store};
use crate::vector::FastEmbedGenerator;

/// Build the embedding provider and the configured store.
pub async fn open_configured_store(config: &Settings) -> anyhow::Result<Arc<dyn VectorStore>> {
    let embedder = FastEmbedGenerator::from_settings(&config.embedding)
        .with_context(|| format!("Failed to load embedding model {}", config.embedding.model))?;

    open_store(config, Arc::new(embedder))
        .await
        .with_context(|| format!("Failed to open {} vector store", config.vector_store.kind))
}

/// [`open_configured_store`], exiting the process on failure.
pub async fn open_store_or_exit(config: &Settings) -> Arc<dyn VectorStore> {
    match open_configured_store(config).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    }
}
