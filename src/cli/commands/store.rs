//! Store backend switching.

use std::path::{Path, PathBuf};

use crate::cli::StoreAction;
use crate::config::{CONFIG_DIR, CONFIG_FILE, Settings};

/// Run store command.
pub fn run(action: StoreAction, cli_config: Option<&Path>) {
    match action {
        StoreAction::Switch { kind } => {
            let path = settings_path(cli_config);
            if let Err(e) = Settings::switch_vector_store(&path, kind) {
                eprintln!("Failed to update {}: {e}", path.display());
                std::process::exit(1);
            }
            println!("Vector store set to '{kind}' in {}", path.display());

            // The edited file must still load
            match Settings::load_from(&path) {
                Ok(settings) => {
                    if kind == crate::config::VectorStoreKind::Cloud
                        && settings.vector_store.cloud.api_key.is_none()
                    {
                        eprintln!("Warning: no API key configured; set PINECONE_API_KEY.");
                    }
                }
                Err(e) => eprintln!("Warning: settings file no longer loads: {e}"),
            }
        }
    }
}

/// File the switch edits: explicit `--config`, else the workspace file.
fn settings_path(cli_config: Option<&Path>) -> PathBuf {
    match cli_config {
        Some(path) => path.to_path_buf(),
        None => Settings::workspace_root()
            .unwrap_or_default()
            .join(CONFIG_DIR)
            .join(CONFIG_FILE),
    }
}
