//! Capability interfaces the core consumes. Backends live in
//! `infrastructure`; tests substitute their own.

use crate::models::{EmbeddingVector, InventoryRecord};
use crate::prompt::Prompt;
use async_trait::async_trait;
use shared::types::{Error, Result};

/// Deterministic text-to-vector mapping.
///
/// Implementations must fail on blank input instead of returning a zero
/// vector, and `embed_batch` must preserve order and length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Default implementation embeds one text at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;

    /// Identifies the vector space this embedder produces. Indices built
    /// under one signature are never served under another.
    fn signature(&self) -> String {
        format!("{}:{}", self.name(), self.dimension())
    }
}

/// External language model.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Read side of the inventory store.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Full snapshot of a user's records, in insertion order.
    async fn list_records(&self, user_id: &str) -> Result<Vec<InventoryRecord>>;

    /// Record count; only used as a staleness hint.
    async fn count(&self, user_id: &str) -> Result<usize>;
}

/// Rejects blank embedding input.
pub fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::embedding("cannot embed empty text"));
    }
    Ok(())
}
