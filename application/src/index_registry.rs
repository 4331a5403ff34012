//! Registry of per-user vector indices.
//!
//! Every user gets a slot holding the currently servable index and its
//! lifecycle phase. Rebuilds for one user are serialized by the slot's build
//! permit; different users never contend. Builds run on their own task so a
//! caller that stops waiting cannot leave a slot stuck in `Building`.

use domain::index::{IndexEntry, IndexFingerprint, IndexPhase, UserIndex};
use domain::ports::{Embedder, InventoryStore};
use infrastructure::index_snapshot::IndexSnapshotStore;
use shared::telemetry::Telemetry;
use shared::types::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

struct SlotState {
    phase: IndexPhase,
    current: Option<Arc<UserIndex>>,
    /// Bumped by every `mark_stale`; a build that started under an older
    /// value finishes as `Stale` rather than `Ready`.
    invalidations: u64,
}

struct UserSlot {
    build_permit: Arc<Mutex<()>>,
    state: RwLock<SlotState>,
}

impl UserSlot {
    fn new() -> Self {
        Self {
            build_permit: Arc::new(Mutex::new(())),
            state: RwLock::new(SlotState {
                phase: IndexPhase::Absent,
                current: None,
                invalidations: 0,
            }),
        }
    }
}

#[derive(Clone)]
struct IndexBuilder {
    store: Arc<dyn InventoryStore>,
    embedder: Arc<dyn Embedder>,
    snapshots: Option<IndexSnapshotStore>,
}

impl IndexBuilder {
    async fn build(&self, user_id: &str) -> Result<UserIndex> {
        let records = self
            .store
            .list_records(user_id)
            .await
            .map_err(|e| Error::index_build(user_id, e))?;
        let fingerprint = IndexFingerprint::of(&records, self.embedder.signature());
        if records.is_empty() {
            return Ok(UserIndex::new(user_id, Vec::new(), fingerprint));
        }

        let texts: Vec<String> = records.iter().map(|r| r.display_text()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| Error::index_build(user_id, e))?;
        if vectors.len() != records.len() {
            return Err(Error::index_build(
                user_id,
                format!(
                    "embedder {} returned {} vectors for {} records",
                    self.embedder.name(),
                    vectors.len(),
                    records.len()
                ),
            ));
        }

        let entries = records
            .into_iter()
            .zip(vectors)
            .map(|(record, vector)| IndexEntry { record, vector })
            .collect();
        Ok(UserIndex::new(user_id, entries, fingerprint))
    }

    /// A persisted snapshot is only trusted when it was embedded by the same
    /// embedder and its records still match the store's, content included.
    async fn restore(&self, user_id: &str) -> Option<UserIndex> {
        let snapshots = self.snapshots.as_ref()?;
        let snapshot = match snapshots.load(user_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                warn!(user_id, error = %err, "ignoring unreadable index snapshot");
                return None;
            }
        };
        let signature = self.embedder.signature();
        if !snapshot.fingerprint().same_space(&signature) {
            info!(
                user_id,
                snapshot_embedder = %snapshot.fingerprint().embedder,
                embedder = %signature,
                "index snapshot was built by another embedder"
            );
            return None;
        }

        let count = match self.store.count(user_id).await {
            Ok(count) => count,
            Err(err) => {
                warn!(user_id, error = %err, "could not validate index snapshot");
                return None;
            }
        };
        if count != snapshot.fingerprint().record_count {
            debug!(
                user_id,
                snapshot_records = snapshot.fingerprint().record_count,
                store_records = count,
                "index snapshot out of date"
            );
            return None;
        }

        let records = match self.store.list_records(user_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(user_id, error = %err, "could not validate index snapshot");
                return None;
            }
        };
        if !snapshot
            .fingerprint()
            .same_source(&IndexFingerprint::of(&records, signature))
        {
            debug!(user_id, "index snapshot content differs from the store");
            return None;
        }
        Some(snapshot)
    }

    async fn persist(&self, index: &UserIndex) {
        if let Some(snapshots) = &self.snapshots {
            if let Err(err) = snapshots.save(index).await {
                warn!(user_id = index.user_id(), error = %err, "failed to persist index snapshot");
            }
        }
    }
}

/// Runs one build while holding the user's build permit.
async fn run_build(
    builder: IndexBuilder,
    slot: Arc<UserSlot>,
    _permit: OwnedMutexGuard<()>,
    user_id: String,
    allow_snapshot: bool,
) -> Result<Arc<UserIndex>> {
    let (prior_phase, had_index, started_at) = {
        let mut state = slot.state.write().await;
        let prior = state.phase;
        state.phase = IndexPhase::Building;
        (prior, state.current.is_some(), state.invalidations)
    };
    let telemetry = Telemetry::new();
    info!(user_id = %user_id, prior = ?prior_phase, "building index");

    if allow_snapshot && !had_index {
        if let Some(snapshot) = builder.restore(&user_id).await {
            let index = Arc::new(snapshot);
            let mut state = slot.state.write().await;
            state.current = Some(Arc::clone(&index));
            state.phase = if state.invalidations == started_at {
                IndexPhase::Ready
            } else {
                IndexPhase::Stale
            };
            info!(user_id = %user_id, records = index.len(), "index restored from snapshot");
            return Ok(index);
        }
    }

    match builder.build(&user_id).await {
        Ok(index) => {
            let index = Arc::new(index);
            {
                let mut state = slot.state.write().await;
                state.current = Some(Arc::clone(&index));
                state.phase = if state.invalidations == started_at {
                    IndexPhase::Ready
                } else {
                    IndexPhase::Stale
                };
            }
            info!(
                user_id = %user_id,
                records = index.len(),
                elapsed_ms = telemetry.elapsed_ms(),
                "index built"
            );
            builder.persist(&index).await;
            Ok(index)
        }
        Err(err) => {
            let mut state = slot.state.write().await;
            // An invalidation that arrived mid-build still applies to the
            // index being served.
            state.phase = if state.invalidations != started_at && state.current.is_some() {
                IndexPhase::Stale
            } else {
                prior_phase
            };
            warn!(user_id = %user_id, error = %err, phase = ?state.phase, "index build failed");
            Err(err)
        }
    }
}

pub struct IndexRegistry {
    builder: IndexBuilder,
    slots: Mutex<HashMap<String, Arc<UserSlot>>>,
}

impl IndexRegistry {
    pub fn new(store: Arc<dyn InventoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            builder: IndexBuilder {
                store,
                embedder,
                snapshots: None,
            },
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_snapshots(mut self, snapshots: IndexSnapshotStore) -> Self {
        self.builder.snapshots = Some(snapshots);
        self
    }

    /// The embedder indices are built with; queries must use the same one.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.builder.embedder)
    }

    async fn slot(&self, user_id: &str) -> Arc<UserSlot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(UserSlot::new())),
        )
    }

    async fn spawn_build(
        &self,
        user_id: &str,
        slot: Arc<UserSlot>,
        permit: OwnedMutexGuard<()>,
        allow_snapshot: bool,
    ) -> Result<Arc<UserIndex>> {
        let task = tokio::spawn(run_build(
            self.builder.clone(),
            slot,
            permit,
            user_id.to_string(),
            allow_snapshot,
        ));
        task.await
            .map_err(|e| Error::index_build(user_id, format!("build task aborted: {e}")))?
    }

    /// Returns a servable index, building one first if the user has none.
    ///
    /// While a rebuild is running, callers get the previous index. A stale
    /// index is rebuilt by whichever caller grabs the build permit first;
    /// everyone else keeps reading the stale copy until the swap.
    pub async fn get_index(&self, user_id: &str) -> Result<Arc<UserIndex>> {
        let slot = self.slot(user_id).await;

        let stale = {
            let state = slot.state.read().await;
            match (state.phase, &state.current) {
                (IndexPhase::Ready, Some(index)) | (IndexPhase::Building, Some(index)) => {
                    return Ok(Arc::clone(index));
                }
                (IndexPhase::Stale, Some(index)) => Some(Arc::clone(index)),
                _ => None,
            }
        };

        if let Some(stale_index) = stale {
            let Ok(permit) = Arc::clone(&slot.build_permit).try_lock_owned() else {
                debug!(user_id, "rebuild in progress, serving stale index");
                return Ok(stale_index);
            };
            return match self.spawn_build(user_id, slot, permit, false).await {
                Ok(index) => Ok(index),
                Err(err) => {
                    warn!(user_id, error = %err, "serving stale index after failed rebuild");
                    Ok(stale_index)
                }
            };
        }

        let permit = Arc::clone(&slot.build_permit).lock_owned().await;
        // Another caller may have finished the first build while we waited.
        let existing = {
            let state = slot.state.read().await;
            state.current.as_ref().map(|index| (state.phase, Arc::clone(index)))
        };
        match existing {
            Some((IndexPhase::Stale, stale_index)) => {
                match self.spawn_build(user_id, slot, permit, false).await {
                    Ok(index) => Ok(index),
                    Err(err) => {
                        warn!(user_id, error = %err, "serving stale index after failed rebuild");
                        Ok(stale_index)
                    }
                }
            }
            Some((_, index)) => Ok(index),
            None => self.spawn_build(user_id, slot, permit, true).await,
        }
    }

    /// Flags the user's index for rebuild without discarding it. Returns the
    /// phase after the call.
    pub async fn mark_stale(&self, user_id: &str) -> IndexPhase {
        let slot = self.slot(user_id).await;
        let mut state = slot.state.write().await;
        state.invalidations += 1;
        if state.phase == IndexPhase::Ready {
            state.phase = IndexPhase::Stale;
            debug!(user_id, "index marked stale");
        }
        state.phase
    }

    /// Rebuilds unconditionally, waiting for any in-flight build first.
    /// Returns the number of indexed records.
    pub async fn force_refresh(&self, user_id: &str) -> Result<usize> {
        let slot = self.slot(user_id).await;
        let permit = Arc::clone(&slot.build_permit).lock_owned().await;
        let index = self.spawn_build(user_id, slot, permit, false).await?;
        Ok(index.len())
    }

    /// Marks the index stale when the store's record count no longer matches
    /// the build fingerprint. Returns whether it was marked.
    pub async fn check_freshness(&self, user_id: &str) -> Result<bool> {
        let slot = self.slot(user_id).await;
        let built_count = {
            let state = slot.state.read().await;
            match (state.phase, &state.current) {
                (IndexPhase::Ready, Some(index)) => index.fingerprint().record_count,
                _ => return Ok(false),
            }
        };
        let current_count = self.builder.store.count(user_id).await?;
        if current_count == built_count {
            return Ok(false);
        }
        info!(user_id, built_count, current_count, "inventory changed since last build");
        self.mark_stale(user_id).await;
        Ok(true)
    }

    pub async fn phase(&self, user_id: &str) -> IndexPhase {
        let slots = self.slots.lock().await;
        match slots.get(user_id) {
            Some(slot) => slot.state.read().await.phase,
            None => IndexPhase::Absent,
        }
    }
}
