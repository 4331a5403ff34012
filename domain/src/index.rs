//! Per-user vector index and its lifecycle vocabulary.

use crate::models::{EmbeddingVector, InventoryRecord};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle phase of a user's index as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Absent,
    Building,
    Ready,
    Stale,
}

/// Cheap summary of the source records captured with a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFingerprint {
    pub record_count: usize,
    pub digest: String,
    pub built_at_ms: u64,
    /// Signature of the embedder that produced the vectors.
    pub embedder: String,
}

impl IndexFingerprint {
    pub fn of(records: &[InventoryRecord], embedder: impl Into<String>) -> Self {
        let mut context = md5::Context::new();
        for record in records {
            context.consume(record.id.as_bytes());
            context.consume([0u8]);
            context.consume(record.display_text().as_bytes());
            context.consume([0u8]);
        }
        let built_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            record_count: records.len(),
            digest: format!("{:x}", context.compute()),
            built_at_ms,
            embedder: embedder.into(),
        }
    }

    /// Same source data, ignoring when the build happened and which
    /// embedder ran.
    pub fn same_source(&self, other: &IndexFingerprint) -> bool {
        self.record_count == other.record_count && self.digest == other.digest
    }

    /// Whether vectors from an embedder with this signature are comparable
    /// to the indexed ones.
    pub fn same_space(&self, embedder_signature: &str) -> bool {
        self.embedder == embedder_signature
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub record: InventoryRecord,
    pub vector: EmbeddingVector,
}

/// Fully built, read-only index for one user. Entries keep inventory order.
#[derive(Debug, Clone, PartialEq)]
pub struct UserIndex {
    user_id: String,
    entries: Vec<IndexEntry>,
    fingerprint: IndexFingerprint,
}

impl UserIndex {
    pub fn new(user_id: impl Into<String>, entries: Vec<IndexEntry>, fingerprint: IndexFingerprint) -> Self {
        Self {
            user_id: user_id.into(),
            entries,
            fingerprint,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprint(&self) -> &IndexFingerprint {
        &self.fingerprint
    }
}
