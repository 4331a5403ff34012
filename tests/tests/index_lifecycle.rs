use application::index_registry::IndexRegistry;
use domain::index::IndexPhase;
use infrastructure::embedder::HashingEmbedder;
use infrastructure::index_snapshot::IndexSnapshotStore;
use shared::types::Error;
use std::sync::Arc;
use std::time::Duration;
use tests::{CountingStore, FailingEmbedder, SwitchableEmbedder};
use tokio::task::JoinSet;

fn registry(store: Arc<CountingStore>) -> Arc<IndexRegistry> {
    Arc::new(IndexRegistry::new(store, Arc::new(HashingEmbedder::new(64))))
}

async fn wait_for_lists(store: &CountingStore, at_least: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.lists() < at_least {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("store was never read");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_for_one_user_never_overlap() {
    let store = CountingStore::new(Duration::from_millis(20));
    store.seed("u1", &["rice", "dhal", "coconut"]).await;
    let registry = registry(store.clone());

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move { registry.force_refresh("u1").await });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), 3);
    }

    assert_eq!(store.lists(), 5);
    assert_eq!(store.max_in_flight(), 1);
    assert_eq!(registry.phase("u1").await, IndexPhase::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_reads_share_one_build() {
    let store = CountingStore::new(Duration::from_millis(20));
    store.seed("u1", &["rice", "dhal"]).await;
    let registry = registry(store.clone());

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move { registry.get_index("u1").await.map(|index| index.len()) });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), 2);
    }
    assert_eq!(store.lists(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_slow_build_does_not_block_other_users() {
    let store = CountingStore::new(Duration::ZERO);
    store.seed("slow", &["rice"]).await;
    store.seed("fast", &["dhal", "onion"]).await;
    store.hold("slow");
    let registry = registry(store.clone());

    let slow = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.force_refresh("slow").await })
    };
    wait_for_lists(&store, 1).await;
    assert_eq!(registry.phase("slow").await, IndexPhase::Building);

    let fast = tokio::time::timeout(Duration::from_secs(1), registry.force_refresh("fast"))
        .await
        .expect("fast user waited on slow user's build");
    assert_eq!(fast.unwrap(), 2);
    assert_eq!(registry.phase("fast").await, IndexPhase::Ready);

    store.release();
    assert_eq!(slow.await.unwrap().unwrap(), 1);
    assert_eq!(registry.phase("slow").await, IndexPhase::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_keep_the_old_index_during_a_rebuild() {
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice", "dhal", "coconut"]).await;
    let registry = registry(store.clone());
    assert_eq!(registry.get_index("u1").await.unwrap().len(), 3);

    store.add("u1", "chicken").await;
    assert!(registry.check_freshness("u1").await.unwrap());
    assert_eq!(registry.phase("u1").await, IndexPhase::Stale);

    store.hold("u1");
    let rebuild = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.force_refresh("u1").await })
    };
    wait_for_lists(&store, 2).await;

    let during = registry.get_index("u1").await.unwrap();
    assert_eq!(during.len(), 3);

    store.release();
    assert_eq!(rebuild.await.unwrap().unwrap(), 4);
    assert_eq!(registry.get_index("u1").await.unwrap().len(), 4);
    assert!(!registry.check_freshness("u1").await.unwrap());
}

#[tokio::test]
async fn unbuildable_index_leaves_user_absent() {
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice"]).await;
    let registry = IndexRegistry::new(store, Arc::new(FailingEmbedder { dimension: 8 }));

    let err = registry.get_index("u1").await.unwrap_err();
    assert!(matches!(err, Error::IndexBuild { .. }));
    assert_eq!(registry.phase("u1").await, IndexPhase::Absent);
    assert!(registry.force_refresh("u1").await.is_err());
    assert_eq!(registry.phase("u1").await, IndexPhase::Absent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalidation_during_a_failed_rebuild_is_not_lost() {
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice", "dhal"]).await;
    let embedder = SwitchableEmbedder::new(64);
    let registry = Arc::new(IndexRegistry::new(store.clone(), embedder.clone()));
    let original = registry.get_index("u1").await.unwrap();

    store.hold("u1");
    embedder.set_offline(true);
    let rebuild = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.force_refresh("u1").await })
    };
    wait_for_lists(&store, 2).await;
    assert_eq!(registry.phase("u1").await, IndexPhase::Building);

    store.add("u1", "coconut").await;
    assert_eq!(registry.mark_stale("u1").await, IndexPhase::Building);

    store.release();
    assert!(rebuild.await.unwrap().is_err());
    assert_eq!(registry.phase("u1").await, IndexPhase::Stale);
    assert!(Arc::ptr_eq(&registry.get_index("u1").await.unwrap(), &original));

    embedder.set_offline(false);
    assert_eq!(registry.get_index("u1").await.unwrap().len(), 3);
    assert_eq!(registry.phase("u1").await, IndexPhase::Ready);
}

#[tokio::test]
async fn snapshot_is_reused_across_registries_when_content_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice", "dhal"]).await;

    let first = IndexRegistry::new(store.clone(), Arc::new(HashingEmbedder::new(64)))
        .with_snapshots(IndexSnapshotStore::open(&path).unwrap());
    let built = first.get_index("u1").await.unwrap();

    let second = IndexRegistry::new(store.clone(), Arc::new(HashingEmbedder::new(64)))
        .with_snapshots(IndexSnapshotStore::open(&path).unwrap());
    let restored = second.get_index("u1").await.unwrap();
    assert_eq!(restored.len(), 2);
    // A rebuild would carry a fresh timestamp.
    assert_eq!(restored.fingerprint(), built.fingerprint());

    store.add("u1", "onion").await;
    let third = IndexRegistry::new(store.clone(), Arc::new(HashingEmbedder::new(64)))
        .with_snapshots(IndexSnapshotStore::open(&path).unwrap());
    assert_eq!(third.get_index("u1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn snapshot_from_a_different_embedder_is_not_served() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice", "dhal"]).await;

    IndexRegistry::new(store.clone(), Arc::new(HashingEmbedder::new(64)))
        .with_snapshots(IndexSnapshotStore::open(&path).unwrap())
        .get_index("u1")
        .await
        .unwrap();

    let reconfigured = IndexRegistry::new(store.clone(), Arc::new(HashingEmbedder::new(384)))
        .with_snapshots(IndexSnapshotStore::open(&path).unwrap());
    let index = reconfigured.get_index("u1").await.unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.fingerprint().embedder, "hashing:384");
    assert!(index.entries().iter().all(|entry| entry.vector.dimension() == 384));
}
