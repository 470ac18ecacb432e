//! Search and ask commands.

use serde_json::Value;

use crate::config::Settings;
use crate::documents::{Metadata, UNKNOWN_SOURCE, keys, preview};
use crate::retrieve::SearchTool;

const PREVIEW_CHARS: usize = 200;

/// Run search command - ranked hits with scores.
pub async fn run_search(
    query: &str,
    k: Option<usize>,
    source: Option<String>,
    json: bool,
    config: &Settings,
) {
    let store = super::open_store_or_exit(config).await;
    let tool = SearchTool::new(store, Some(config.retrieval.top_k));

    let filter = source.map(|source| {
        let mut filter = Metadata::new();
        filter.insert(keys::SOURCE.to_string(), Value::String(source));
        filter
    });

    let hits = match tool.search_raw(query, k, filter.as_ref()).await {
        Ok(hits) => hits,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&hits).unwrap_or_default()
        );
    } else if hits.is_empty() {
        eprintln!("No results found.");
    } else {
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "\n{}. {} (score: {:.3})",
                i + 1,
                hit.source().unwrap_or(UNKNOWN_SOURCE),
                hit.score
            );
            if let Some(page) = hit.metadata.get(keys::PAGE) {
                println!("   Page: {page}");
            }
            println!("   Preview: {}", preview(&hit.content, PREVIEW_CHARS));
        }
    }
}

/// Run ask command - the search tool output as the agent sees it.
pub async fn run_ask(query: &str, config: &Settings) {
    let store = super::open_store_or_exit(config).await;
    let tool = SearchTool::new(store, Some(config.retrieval.top_k));

    match tool.search(query).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
