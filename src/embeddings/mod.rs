// Embeddings module
// Word-window chunking, the embedding model seam and the Ollama client

pub mod chunking;
pub mod ollama;


use async_trait::async_trait;
use tracing::debug;

use crate::{QaError, Result};

pub use chunking::{ChunkingConfig, chunk_text};
pub use ollama::OllamaClient;

/// A text embedding model.
///
/// Implementations return one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Embed `texts`, checking that the model returned exactly one non-empty
/// vector per text and that all vectors share one dimensionality.
///
/// Any failure is reported as [`QaError::Embedding`] so the caller can drop
/// the whole batch.
#[inline]
pub async fn embed_texts(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder.embed(texts).await.map_err(|e| match e {
        QaError::Embedding(_) => e,
        other => QaError::Embedding(other.to_string()),
    })?;

    if vectors.len() != texts.len() {
        return Err(QaError::Embedding(format!(
            "model {} returned {} vectors for {} texts",
            embedder.model_name(),
            vectors.len(),
            texts.len()
        )));
    }

    let dimension = vectors[0].len();
    if dimension == 0 {
        return Err(QaError::Embedding(format!(
            "model {} returned an empty vector",
            embedder.model_name()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(QaError::Embedding(format!(
            "model {} returned mixed dimensions {} and {}",
            embedder.model_name(),
            dimension,
            bad.len()
        )));
    }

    debug!(
        "Embedded {} texts with {} ({} dimensions)",
        texts.len(),
        embedder.model_name(),
        dimension
    );

    Ok(vectors)
}

/// Embed a single query string
#[inline]
pub async fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    let mut vectors = embed_texts(embedder, &[query.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| QaError::Embedding("model returned no vector for query".to_string()))
}
