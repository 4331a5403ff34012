use crate::index_registry::IndexRegistry;
use domain::models::RetrievedContext;
use domain::ports::Embedder;
use infrastructure::search::SearchEngine;
use shared::types::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// k-nearest-neighbour lookup over one user's index.
///
/// Similarity is cosine over L2-normalized vectors (equivalently, inner
/// product). Ties keep inventory insertion order.
pub struct Retriever {
    registry: Arc<IndexRegistry>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(registry: Arc<IndexRegistry>) -> Self {
        let embedder = registry.embedder();
        Self { registry, embedder }
    }

    pub async fn retrieve(&self, user_id: &str, query_text: &str, k: usize) -> Result<RetrievedContext> {
        if k == 0 {
            return Err(Error::retrieval("k must be a positive integer"));
        }
        let index = self.registry.get_index(user_id).await.map_err(|err| match err {
            Error::IndexBuild { reason, .. } => Error::index_unavailable(user_id, reason),
            other => other,
        })?;
        if index.is_empty() {
            debug!(user_id, "index is empty, returning no context");
            return Ok(RetrievedContext::empty());
        }

        let query = self.embedder.embed(query_text).await?;
        let hits = SearchEngine::top_k(&query, index.entries(), k);
        debug!(user_id, k, hits = hits.len(), "retrieved context");
        Ok(RetrievedContext::new(hits))
    }
}
