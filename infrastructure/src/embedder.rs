//! Embedding backends.
//!
//! Both backends return L2-normalized vectors, so cosine similarity and
//! inner product rank identically downstream.

use super::ollama_client::OllamaClient;
use async_trait::async_trait;
use domain::models::EmbeddingVector;
use domain::ports::{ensure_embeddable, Embedder};
use futures::stream::{self, StreamExt, TryStreamExt};
use shared::text::normalize_phrase;
use shared::types::{Error, Result};

/// Weight of character trigram features relative to whole-word features.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Local, dependency-free embedder based on feature hashing.
///
/// Words (normalized and singularized) and their character trigrams are
/// hashed into `dimension` signed buckets. Identical text always maps to the
/// same vector, and texts sharing words or word fragments score close.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = md5::compute(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        let value = u64::from_le_bytes(head);
        let index = (value % self.dimension as u64) as usize;
        let sign = if digest.0[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn vectorize(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_embeddable(text)?;
        let normalized = normalize_phrase(text);
        let mut values = vec![0.0f32; self.dimension];
        for word in normalized.split(' ').filter(|w| !w.is_empty()) {
            let (index, sign) = self.bucket(word);
            values[index] += sign;

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                let (index, sign) = self.bucket(&format!("#{gram}"));
                values[index] += sign * TRIGRAM_WEIGHT;
            }
        }
        let vector = EmbeddingVector::normalized(values);
        if vector.is_zero() {
            return Err(Error::embedding(format!(
                "text has no embeddable tokens: {text:?}"
            )));
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.vectorize(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        texts.iter().map(|text| self.vectorize(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Embeddings served by an Ollama model.
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    const MAX_IN_FLIGHT: usize = 8;

    pub fn new(client: OllamaClient, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_embeddable(text)?;
        let raw = self.client.generate_embedding(&self.model, text).await?;
        if raw.len() != self.dimension {
            return Err(Error::embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                raw.len(),
                self.dimension
            )));
        }
        let vector = EmbeddingVector::normalized(raw);
        if vector.is_zero() {
            return Err(Error::embedding("backend returned a zero vector"));
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        // `buffered` keeps input order, unlike `buffer_unordered`.
        let requests: Vec<_> = texts.iter().map(|text| self.embed(text)).collect();
        stream::iter(requests)
            .buffered(Self::MAX_IN_FLIGHT)
            .try_collect()
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn signature(&self) -> String {
        format!("ollama:{}:{}", self.model, self.dimension)
    }
}
