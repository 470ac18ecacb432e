//! Ingest command.

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::ingest::{IngestProgress, Ingestor};

/// Run ingest command for a file or a directory.
pub async fn run(path: &Path, no_progress: bool, config: &Settings) {
    if !path.exists() {
        eprintln!("Path not found: {}", path.display());
        std::process::exit(1);
    }

    let store = super::open_store_or_exit(config).await;
    let ingestor = Ingestor::from_settings(store.clone(), config);

    let bar = if no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("Loading {}", path.display()));
        bar
    };

    let result = ingestor
        .ingest_path_with_progress(path, |event| update_bar(&bar, event))
        .await;
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            println!(
                "Ingested {}: {} text unit(s), {} chunk(s) in {} batch(es)",
                report.source.display(),
                report.text_units,
                report.chunks,
                report.batches
            );
            if let Ok(count) = store.count().await {
                println!("Collection now holds {count} chunk(s)");
            }
        }
        Err(e) => {
            eprintln!("Ingestion failed: {e}");
            std::process::exit(1);
        }
    }
}

fn update_bar(bar: &ProgressBar, event: IngestProgress) {
    match event {
        IngestProgress::Loaded { text_units } => {
            bar.set_message(format!("Loaded {text_units} text unit(s), chunking"));
        }
        IngestProgress::Chunked { chunks } => {
            bar.set_message(format!("Embedding and storing {chunks} chunk(s)"));
        }
        IngestProgress::BatchStored { current, total } => {
            if bar.length() != Some(total as u64) {
                bar.set_length(total as u64);
                if let Ok(style) =
                    ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} batches {msg}")
                {
                    bar.set_style(style.progress_chars("=> "));
                }
            }
            bar.set_position(current as u64);
        }
    }
}
