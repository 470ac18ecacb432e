//! Store administration: stats, documents, delete, reset.

use std::io::{BufRead, Write};

use serde::Serialize;

use crate::config::Settings;
use crate::store::StoreDescription;

#[derive(Serialize)]
struct Stats {
    #[serde(flatten)]
    description: StoreDescription,
    count: usize,
}

/// Run stats command.
pub async fn run_stats(json: bool, config: &Settings) {
    let store = super::open_store_or_exit(config).await;
    let count = match store.count().await {
        Ok(count) => count,
        Err(e) => {
            eprintln!("Failed to count records: {e}");
            std::process::exit(1);
        }
    };

    let stats = Stats {
        description: store.describe(),
        count,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).unwrap_or_default()
        );
        return;
    }

    println!("Vector Store");
    println!("{}", "=".repeat(50));
    println!("Backend:     {}", stats.description.backend);
    println!("Collection:  {}", stats.description.name);
    println!("Location:    {}", stats.description.location);
    println!("Dimension:   {}", stats.description.dimension);
    println!("Model:       {}", stats.description.embedding_model);
    println!("Chunks:      {}", stats.count);
}

/// Run documents command - inventory grouped by source.
pub async fn run_documents(json: bool, config: &Settings) {
    let store = super::open_store_or_exit(config).await;
    let inventory = match store.get_all_documents().await {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("Failed to list documents: {e}");
            std::process::exit(1);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&inventory).unwrap_or_default()
        );
        return;
    }

    if inventory.documents.is_empty() {
        eprintln!("No documents stored.");
        return;
    }

    for document in &inventory.documents {
        let characters: usize = document.chunks.iter().map(|c| c.content_length).sum();
        println!(
            "{}  ({} chunk(s), {characters} chars)",
            document.source, document.total_chunks
        );
    }
    println!(
        "\n{} document(s), {} chunk(s)",
        inventory.total_documents, inventory.total_chunks
    );
    if inventory.may_be_incomplete {
        eprintln!("Note: the backend listed only part of the stored records.");
    }
}

/// Run delete command for one source.
pub async fn run_delete(source: &str, config: &Settings) {
    let store = super::open_store_or_exit(config).await;
    match store.delete_by_source(source).await {
        Ok(outcome) => println!("{source}: {outcome}"),
        Err(e) => {
            eprintln!("Failed to delete '{source}': {e}");
            std::process::exit(1);
        }
    }
}

/// Run reset command, asking first unless `yes` is set.
pub async fn run_reset(yes: bool, config: &Settings) {
    if !yes && !confirm("Delete every stored chunk?") {
        eprintln!("Aborted.");
        return;
    }

    let store = super::open_store_or_exit(config).await;
    match store.reset().await {
        Ok(()) => println!("Vector store '{}' reset.", store.describe().name),
        Err(e) => {
            eprintln!("Reset failed: {e}");
            std::process::exit(1);
        }
    }
}

fn confirm(prompt: &str) -> bool {
    eprint!("{prompt} [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
