//! Embedding provider abstraction and the local fastembed implementation.
//!
//! A single fixed sentence-embedding model is used for both ingestion and
//! querying; mismatched models make similarity scores meaningless, so the
//! persisted index records its model name and the query pipeline refuses an
//! index built with a different one.
//!
//! The model runs locally via fastembed. Weights are downloaded from the
//! Hugging Face hub on first use and cached; after that, embedding is fully
//! offline. Inference is deterministic: the same text always produces the
//! same vector.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};

use crate::config::EmbeddingConfig;

/// Interface the pipelines embed through. Implementations must be cheap to
/// share; the expensive model load happens once at construction.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"bge-large-en-v1.5"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts; one vector per input, in input order.
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Embed a batch on the blocking pool (model inference is CPU-bound).
pub async fn embed_texts(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    tokio::task::spawn_blocking(move || provider.embed_batch(texts)).await?
}

/// Embed a single query text.
pub async fn embed_query(provider: Arc<dyn EmbeddingProvider>, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(provider, vec![text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding result"))
}

/// Local fastembed provider. Holds the loaded model for the process
/// lifetime; `embed` takes `&mut`, hence the mutex.
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Mutex<fastembed::TextEmbedding>,
}

impl LocalEmbedder {
    /// Load the configured model. Downloads weights on first use; a download
    /// failure (no network, hub unreachable) is fatal and not retried here.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let fastembed_model = model_to_fastembed(&config.model)?;
        let dims = model_dims(&config.model);

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims,
            batch_size: config.batch_size,
            model: Mutex::new(model),
        })
    }

    /// Load on the blocking pool; construction downloads and mmaps weights.
    pub async fn load(config: &EmbeddingConfig) -> Result<Arc<Self>> {
        let config = config.clone();
        let embedder =
            tokio::task::spawn_blocking(move || LocalEmbedder::new(&config)).await??;
        Ok(Arc::new(embedder))
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("Embedding model mutex poisoned"))?;

        model
            .embed(texts, Some(self.batch_size))
            .map_err(|e| anyhow::anyhow!("Embedding failed: {}", e))
    }
}

fn model_to_fastembed(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             bge-large-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

fn model_dims(name: &str) -> usize {
    match name {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => 384,
    }
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_is_minus_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn unknown_model_rejected() {
        assert!(model_to_fastembed("word2vec").is_err());
    }

    #[test]
    fn known_model_dims() {
        assert_eq!(model_dims("bge-large-en-v1.5"), 1024);
        assert_eq!(model_dims("all-minilm-l6-v2"), 384);
    }
}
