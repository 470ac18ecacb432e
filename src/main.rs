use clap::Parser;
use docrag::cli::commands::{admin, ingest, init, search, store};
use docrag::cli::{Cli, Commands};
use docrag::{Settings, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // For non-init commands, check if project is initialized
    if !matches!(cli.command, Commands::Init { .. }) && cli.config.is_none() {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    logging::init_with_config(&config.logging);

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&config),
        Commands::Ingest { path, no_progress } => ingest::run(&path, no_progress, &config).await,
        Commands::Search {
            query,
            k,
            source,
            json,
        } => search::run_search(&query, k, source, json, &config).await,
        Commands::Ask { query } => search::run_ask(&query, &config).await,
        Commands::Stats { json } => admin::run_stats(json, &config).await,
        Commands::Documents { json } => admin::run_documents(json, &config).await,
        Commands::Delete { source } => admin::run_delete(&source, &config).await,
        Commands::Reset { yes } => admin::run_reset(yes, &config).await,
        Commands::Store { action } => store::run(action, cli.config.as_deref()),
    }
}
