use domain::index::IndexEntry;
use domain::models::{EmbeddingVector, ScoredRecord};
use rayon::prelude::*;

pub struct SearchEngine;

impl SearchEngine {
    /// Cosine similarity; 0.0 when either side has zero norm, the
    /// dimensions disagree, or a component is not finite.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        let similarity = dot_product / (norm_a * norm_b);
        if similarity.is_finite() {
            similarity
        } else {
            0.0
        }
    }

    /// Scores every entry and keeps the best `top_k`, highest first. Equal
    /// scores keep index (insertion) order.
    pub fn top_k(query: &EmbeddingVector, entries: &[IndexEntry], top_k: usize) -> Vec<ScoredRecord> {
        let scores: Vec<f32> = entries
            .par_iter()
            .map(|entry| Self::cosine_similarity(query.as_slice(), entry.vector.as_slice()))
            .collect();

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        // `sort_by` is stable, which gives the insertion-order tie-break.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| ScoredRecord {
                record: entries[idx].record.clone(),
                score,
            })
            .collect()
    }
}
