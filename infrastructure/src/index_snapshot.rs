//! On-disk snapshots of built user indices, so a restart does not have to
//! re-embed every inventory.

use domain::index::{IndexEntry, IndexFingerprint, UserIndex};
use domain::models::{EmbeddingVector, InventoryRecord};
use rusqlite::{params, Connection, OptionalExtension};
use shared::types::{Error, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct IndexSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl IndexSnapshotStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::store(format!("cannot create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(db_path).map_err(snapshot_error)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(snapshot_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::setup_db(&conn).map_err(snapshot_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn setup_db(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            CREATE TABLE IF NOT EXISTS index_meta (
                user_id TEXT PRIMARY KEY,
                record_count INTEGER NOT NULL,
                digest TEXT NOT NULL,
                built_at_ms INTEGER NOT NULL,
                embedder TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS index_entries (
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                record TEXT NOT NULL,
                vector BLOB NOT NULL,
                PRIMARY KEY (user_id, position)
            );
        ",
        )?;

        // Snapshots written before the embedder column existed match no
        // embedder and are rebuilt on first use.
        let mut stmt = conn.prepare("PRAGMA table_info(index_meta)")?;
        let mut rows = stmt.query([])?;
        let mut has_embedder = false;
        while let Some(row) = rows.next()? {
            let col_name: String = row.get(1)?;
            if col_name == "embedder" {
                has_embedder = true;
                break;
            }
        }
        if !has_embedder {
            warn!("index_meta predates embedder signatures; adding column");
            conn.execute(
                "ALTER TABLE index_meta ADD COLUMN embedder TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
        Ok(())
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::store("snapshot connection lock poisoned"))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| Error::store(format!("snapshot task failed: {e}")))?
    }

    /// Replaces whatever snapshot exists for the index's user.
    pub async fn save(&self, index: &UserIndex) -> Result<()> {
        let user_id = index.user_id().to_string();
        let fingerprint = index.fingerprint().clone();
        let mut rows = Vec::with_capacity(index.len());
        for entry in index.entries() {
            let record = serde_json::to_string(&entry.record)
                .map_err(|e| Error::store(format!("cannot encode record: {e}")))?;
            let vector = serde_json::to_vec(&entry.vector)
                .map_err(|e| Error::store(format!("cannot encode vector: {e}")))?;
            rows.push((record, vector));
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(snapshot_error)?;
            tx.execute("DELETE FROM index_entries WHERE user_id = ?1", [&user_id])
                .map_err(snapshot_error)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO index_entries (user_id, position, record, vector)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(snapshot_error)?;
                for (position, (record, vector)) in rows.iter().enumerate() {
                    stmt.execute(params![user_id, position as i64, record, vector])
                        .map_err(snapshot_error)?;
                }
            }
            tx.execute(
                "INSERT OR REPLACE INTO index_meta
                 (user_id, record_count, digest, built_at_ms, embedder)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    fingerprint.record_count as i64,
                    fingerprint.digest,
                    fingerprint.built_at_ms as i64,
                    fingerprint.embedder
                ],
            )
            .map_err(snapshot_error)?;
            tx.commit().map_err(snapshot_error)?;
            debug!(user_id = %user_id, entries = rows.len(), "index snapshot saved");
            Ok(())
        })
        .await
    }

    /// Loads a user's snapshot, if one was ever saved.
    pub async fn load(&self, user_id: &str) -> Result<Option<UserIndex>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let meta = conn
                .query_row(
                    "SELECT record_count, digest, built_at_ms, embedder
                     FROM index_meta WHERE user_id = ?1",
                    [&user_id],
                    |row| {
                        Ok(IndexFingerprint {
                            record_count: row.get::<_, i64>(0)? as usize,
                            digest: row.get(1)?,
                            built_at_ms: row.get::<_, i64>(2)? as u64,
                            embedder: row.get(3)?,
                        })
                    },
                )
                .optional()
                .map_err(snapshot_error)?;
            let Some(fingerprint) = meta else {
                return Ok(None);
            };

            let mut stmt = conn
                .prepare(
                    "SELECT record, vector FROM index_entries
                     WHERE user_id = ?1 ORDER BY position",
                )
                .map_err(snapshot_error)?;
            let mut rows = stmt.query([&user_id]).map_err(snapshot_error)?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next().map_err(snapshot_error)? {
                let record_json: String = row.get(0).map_err(snapshot_error)?;
                let vector_bytes: Vec<u8> = row.get(1).map_err(snapshot_error)?;
                let record: InventoryRecord = serde_json::from_str(&record_json)
                    .map_err(|e| Error::store(format!("corrupt snapshot record: {e}")))?;
                let vector: EmbeddingVector = serde_json::from_slice(&vector_bytes)
                    .map_err(|e| Error::store(format!("corrupt snapshot vector: {e}")))?;
                entries.push(IndexEntry { record, vector });
            }

            if entries.len() != fingerprint.record_count {
                warn!(
                    user_id = %user_id,
                    entries = entries.len(),
                    expected = fingerprint.record_count,
                    "snapshot entry count disagrees with its metadata"
                );
                return Err(Error::store(format!(
                    "snapshot for {user_id} has {} entries but fingerprint says {}",
                    entries.len(),
                    fingerprint.record_count
                )));
            }
            Ok(Some(UserIndex::new(user_id, entries, fingerprint)))
        })
        .await
    }
}

fn snapshot_error(err: rusqlite::Error) -> Error {
    Error::store(format!("index snapshot: {err}"))
}
