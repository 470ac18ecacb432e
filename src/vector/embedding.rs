//! Embedding generation.
//!
//! The stores only see the [`EmbeddingGenerator`] trait. Production code uses
//! [`FastEmbedGenerator`] (local ONNX models through fastembed); tests and
//! offline runs use [`MockEmbeddingGenerator`], which is deterministic and
//! needs no model download.

use std::path::PathBuf;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::types::{VectorDimension, VectorError};
use crate::config::EmbeddingConfig;

/// Turns text into fixed-dimension vectors.
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed every text, preserving input order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Dimension of every vector this generator produces.
    fn dimension(&self) -> VectorDimension;

    /// Human-readable model name for logs and stats.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Embedding generator backed by a fastembed `TextEmbedding` model.
pub struct FastEmbedGenerator {
    /// fastembed needs `&mut self` to embed.
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_name: String,
    batch_size: Option<usize>,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Create a generator with the default model (AllMiniLML6V2).
    pub fn new() -> Result<Self, VectorError> {
        Self::from_settings(&EmbeddingConfig::default())
    }

    /// Create a generator from the `[embedding]` settings section.
    pub fn from_settings(config: &EmbeddingConfig) -> Result<Self, VectorError> {
        let model = parse_embedding_model(&config.model)?;
        let cache_dir = config.cache_dir.clone().unwrap_or_else(default_models_dir);

        tracing::info!(
            target: "embedding",
            "loading embedding model {} (cache: {})",
            config.model,
            cache_dir.display()
        );

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(config.show_download_progress),
        )
        .map_err(|e| VectorError::ModelInit(e.to_string()))?;

        // Probe the output dimension once
        let probe = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| VectorError::Embedding(e.to_string()))?;
        let width = probe.first().map(Vec::len).unwrap_or(0);
        let dimension = VectorDimension::new(width).ok_or_else(|| {
            VectorError::ModelInit(format!("model {} produced empty vectors", config.model))
        })?;

        tracing::info!(
            target: "embedding",
            "embedding model ready: {} ({dimension} dimensions)",
            config.model
        );

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
            model_name: config.model.clone(),
            batch_size: config.batch_size,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), self.batch_size)
            .map_err(|e| VectorError::Embedding(e.to_string()))?;

        for embedding in &embeddings {
            self.dimension.validate(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Default directory for downloaded model files.
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docrag")
        .join("models")
}

/// Resolve a configured model name to a fastembed model.
///
/// Accepts the fastembed variant name (`AllMiniLML6V2`) as well as the
/// Hugging Face repository name (`sentence-transformers/all-MiniLM-L6-v2`).
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    let normalized: String = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "allminilml12v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomicembedtextv15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "multilinguale5small" => Ok(EmbeddingModel::MultilingualE5Small),
        _ => Err(VectorError::UnknownModel(name.to_string())),
    }
}

/// Deterministic embedding generator based on feature hashing.
///
/// Each lowercase word token is hashed into one signed bucket and the result
/// is L2-normalized, so texts sharing vocabulary score high under cosine
/// similarity and identical texts score exactly 1.0.
#[derive(Debug, Clone)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
    fail_on: Option<String>,
}

impl MockEmbeddingGenerator {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new() -> Self {
        Self::with_dimension(Self::DEFAULT_DIMENSION)
    }

    /// Panics if `dimension` is zero.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).expect("mock dimension must be non-zero"),
            fail_on: None,
        }
    }

    /// Make generation fail for any batch containing `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_on = Some(marker.into());
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut vector = vec![0.0f32; dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if let Some(marker) = &self.fail_on {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(VectorError::Embedding(format!(
                    "mock failure triggered by '{marker}'"
                )));
            }
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_parse_embedding_model_aliases() {
        assert!(matches!(
            parse_embedding_model("AllMiniLML6V2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_embedding_model("sentence-transformers/all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_embedding_model("BAAI/bge-small-en-v1.5"),
            Ok(EmbeddingModel::BGESmallENV15)
        ));
        assert!(matches!(
            parse_embedding_model("no-such-model"),
            Err(VectorError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_mock_embeddings_are_deterministic_and_normalized() {
        let generator = MockEmbeddingGenerator::with_dimension(32);
        let a = generator.generate_embeddings(&["vector stores"]).unwrap();
        let b = generator.generate_embeddings(&["vector stores"]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].len(), 32);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_mock_embeddings_reflect_shared_vocabulary() {
        let generator = MockEmbeddingGenerator::new();
        let vectors = generator
            .generate_embeddings(&[
                "rust ownership and borrowing rules",
                "borrowing rules in rust",
                "banana bread recipe with walnuts",
            ])
            .unwrap();

        let related = cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }

    #[test]
    fn test_mock_failure_marker() {
        let generator = MockEmbeddingGenerator::new().failing_on("POISON");
        assert!(generator.generate_embeddings(&["fine"]).is_ok());
        assert!(generator.generate_embeddings(&["fine", "POISON"]).is_err());
    }
}
