//! Fakes shared by the integration tests.

use async_trait::async_trait;
use domain::models::{EmbeddingVector, InventoryRecord};
use domain::ports::{Embedder, Generator, InventoryStore};
use domain::prompt::Prompt;
use infrastructure::embedder::HashingEmbedder;
use infrastructure::inventory_store::MemoryInventoryStore;
use shared::types::{Error, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Replays canned replies in order and records every prompt it saw.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::default();
        generator.push_replies(replies);
        Arc::new(generator)
    }

    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = self.replies.lock().unwrap();
        queue.extend(replies.into_iter().map(|reply| Ok(reply.into())));
    }

    pub fn push_error(&self, err: Error) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::generation("no scripted reply left")))
    }
}

/// Inventory store that tracks concurrent `list_records` calls and can hold
/// chosen users' reads until released.
pub struct CountingStore {
    inner: MemoryInventoryStore,
    lists: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    read_delay: Duration,
    held_users: Mutex<HashSet<String>>,
    gate: Semaphore,
}

impl CountingStore {
    pub fn new(read_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryInventoryStore::new(),
            lists: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            read_delay,
            held_users: Mutex::new(HashSet::new()),
            gate: Semaphore::new(0),
        })
    }

    pub async fn seed(&self, user_id: &str, names: &[&str]) {
        for name in names {
            self.add(user_id, name).await;
        }
    }

    pub async fn add(&self, user_id: &str, name: &str) {
        let id = format!("{user_id}-{}", self.inner.count(user_id).await.unwrap_or(0));
        self.inner.insert(user_id, InventoryRecord::new(id, name)).await;
    }

    /// Reads for `user_id` block until [`CountingStore::release`].
    pub fn hold(&self, user_id: &str) {
        self.held_users.lock().unwrap().insert(user_id.to_string());
    }

    pub fn release(&self) {
        self.held_users.lock().unwrap().clear();
        // Each held reader hands the permit back when it is done.
        self.gate.add_permits(1);
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryStore for CountingStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<InventoryRecord>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let held = self.held_users.lock().unwrap().contains(user_id);
        if held {
            let _ = self.gate.acquire().await;
        }
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        let records = self.inner.list_records(user_id).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        records
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        self.inner.count(user_id).await
    }
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
        Err(Error::embedding("embedding backend unreachable"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Hashing embedder whose backend can be switched off and on.
pub struct SwitchableEmbedder {
    inner: HashingEmbedder,
    offline: AtomicBool,
}

impl SwitchableEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(dimension),
            offline: AtomicBool::new(false),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for SwitchableEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::embedding("embedding backend unreachable"));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "switchable"
    }
}
