//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::VectorStoreKind;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "Quick Start:
  $ docrag init                        # Create .docrag/settings.toml
  $ docrag ingest ./docs               # Load, chunk and store a directory
  $ docrag search \"vacation policy\"    # Similarity search
  $ docrag documents                   # What is in the store
  $ docrag store switch cloud          # Use the hosted index";

/// Document ingestion and semantic retrieval
#[derive(Parser)]
#[command(
    name = "docrag",
    version = env!("CARGO_PKG_VERSION"),
    about = "Document ingestion and semantic retrieval",
    long_about = "Load PDF, DOCX and text files, split them into overlapping chunks, \
                  embed them and search them by meaning.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = QUICK_START
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the configuration file
    #[command(about = "Set up .docrag directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    #[command(about = "Display active settings")]
    Config,

    /// Ingest a file or a directory
    #[command(about = "Load, chunk, embed and store documents")]
    Ingest {
        /// File or directory to ingest
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Similarity search
    #[command(about = "Search stored chunks by meaning")]
    Search {
        /// Natural language query
        query: String,

        /// Number of results (defaults to retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Only return chunks from this source
        #[arg(long)]
        source: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the agent search tool
    #[command(about = "Print the search tool output exactly as an agent receives it")]
    Ask {
        /// Natural language query
        query: String,
    },

    /// Store statistics
    #[command(about = "Show backend, collection and record count")]
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List stored documents
    #[command(about = "List stored documents grouped by source")]
    Documents {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete one document
    #[command(about = "Delete every chunk of a source")]
    Delete {
        /// Source path exactly as stored in metadata
        source: String,
    },

    /// Delete everything
    #[command(about = "Delete every stored chunk")]
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Vector store settings
    #[command(about = "Manage the vector store backend")]
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
pub enum StoreAction {
    /// Switch the configured backend
    #[command(about = "Switch between the local and the cloud backend")]
    Switch {
        /// Backend to use: local or cloud
        kind: VectorStoreKind,
    },
}
