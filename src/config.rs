//! Configuration module for the document retrieval core.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DOCRAG_` and use double
//! underscores to separate nested levels:
//! - `DOCRAG_CHUNKING__CHUNK_SIZE=500` sets `chunking.chunk_size`
//! - `DOCRAG_VECTOR_STORE__KIND=cloud` sets `vector_store.kind`
//! - `DOCRAG_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`
//!
//! `PINECONE_API_KEY` is also honoured for `vector_store.cloud.api_key`;
//! the prefixed variable wins when both are set.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::documents::ChunkingConfig;

/// Directory holding the workspace configuration.
pub const CONFIG_DIR: &str = ".docrag";

/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .docrag is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunk size and overlap
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Similarity search defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Ingestion batching
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Backing vector store selection
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model name (fastembed variant or Hugging Face repository name)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where model files are cached (defaults to the user cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Batch size passed to the model runtime (None lets the runtime decide)
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: Option<usize>,

    /// Show a progress bar while downloading model files
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Number of results returned when a caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestionConfig {
    /// Chunks written per `add` call during directory ingestion
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
}

/// Which backend serves the vector store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// Disk-backed store in the local process.
    #[default]
    #[serde(alias = "chroma")]
    Local,
    /// Network-addressed hosted index.
    #[serde(alias = "pinecone")]
    Cloud,
}

impl VectorStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStoreKind::Local => "local",
            VectorStoreKind::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for VectorStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "chroma" => Ok(VectorStoreKind::Local),
            "cloud" | "pinecone" => Ok(VectorStoreKind::Cloud),
            other => Err(format!(
                "unknown vector store '{other}', expected 'local' or 'cloud'"
            )),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct VectorStoreConfig {
    /// Backend used by this process
    #[serde(default)]
    pub kind: VectorStoreKind,

    /// Local backend settings
    #[serde(default)]
    pub local: LocalStoreConfig,

    /// Cloud backend settings
    #[serde(default)]
    pub cloud: CloudStoreConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocalStoreConfig {
    /// Directory holding all collections
    #[serde(default = "default_persist_directory")]
    pub persist_directory: PathBuf,

    /// Collection used by this process
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Tantivy writer heap in bytes
    #[serde(default = "default_writer_heap")]
    pub writer_heap_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudStoreConfig {
    /// API key for the hosted index service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Index name
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Namespace inside the index (empty = default namespace)
    #[serde(default)]
    pub namespace: String,

    /// Cloud provider for serverless index creation
    #[serde(default = "default_cloud")]
    pub cloud: String,

    /// Region for serverless index creation
    #[serde(default = "default_region")]
    pub region: String,

    /// Control plane base URL
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    /// API version header value
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long to wait for a newly created index to become ready
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides (e.g. `store = "debug"`)
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_embedding_batch_size() -> Option<usize> {
    Some(64)
}
fn default_top_k() -> usize {
    5
}
fn default_ingest_batch_size() -> usize {
    100
}
fn default_persist_directory() -> PathBuf {
    PathBuf::from("./data/vectorstore")
}
fn default_collection_name() -> String {
    "documents".to_string()
}
fn default_writer_heap() -> usize {
    50_000_000
}
fn default_index_name() -> String {
    "agentic-rag".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_api_version() -> String {
    "2024-07".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_ready_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionConfig::default(),
            vector_store: VectorStoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: None,
            batch_size: default_embedding_batch_size(),
            show_download_progress: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
        }
    }
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            persist_directory: default_persist_directory(),
            collection_name: default_collection_name(),
            writer_heap_bytes: default_writer_heap(),
        }
    }
}

impl Default for CloudStoreConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: default_index_name(),
            namespace: String::new(),
            cloud: default_cloud(),
            region: default_region(),
            control_plane_url: default_control_plane_url(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
            ready_timeout_secs: default_ready_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Conventional variable name for the hosted index key
            .merge(
                Env::raw()
                    .only(&["PINECONE_API_KEY"])
                    .map(|_| "vector_store.cloud.api_key".into()),
            )
            // Double underscore separates nested levels, single underscore
            // stays inside field names
            .merge(Env::prefixed("DOCRAG_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .docrag directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .docrag is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Cannot read configuration file: {e}"))?;
        toml::from_str::<Settings>(&content).map_err(|e| {
            format!(
                "Configuration file is corrupted: {e}\nRun 'docrag init --force' to regenerate."
            )
        })?;

        Ok(())
    }

    /// Validate values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), String> {
        self.chunking.validate()?;

        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be greater than zero".to_string());
        }
        if self.ingestion.batch_size == 0 {
            return Err("ingestion.batch_size must be greater than zero".to_string());
        }
        if self.vector_store.local.collection_name.trim().is_empty() {
            return Err("vector_store.local.collection_name must not be empty".to_string());
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }

        settings.save(&config_path)?;
        Ok(config_path)
    }

    /// Change `vector_store.kind` in a settings file, leaving everything else
    /// in the file untouched. Creates the file if it does not exist.
    pub fn switch_vector_store(
        path: impl AsRef<Path>,
        kind: VectorStoreKind,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();

        let mut table: toml::Table = if path.exists() {
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            toml::Table::new()
        };

        let section = table
            .entry("vector_store")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let section = section
            .as_table_mut()
            .ok_or("vector_store in settings file is not a table")?;
        section.insert(
            "kind".to_string(),
            toml::Value::String(kind.as_str().to_string()),
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&table)?)?;

        Ok(())
    }
}
