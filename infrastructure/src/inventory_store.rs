//! Inventory store backends.
//!
//! A user's snapshot is their inventory items followed by their bill line
//! items, each group in insertion order.

use async_trait::async_trait;
use domain::models::{InventoryRecord, RecordSource};
use domain::ports::InventoryStore;
use rusqlite::{params, Connection};
use shared::types::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// SQLite-backed store. All statements run on the blocking pool.
#[derive(Clone)]
pub struct SqliteInventoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteInventoryStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::store(format!("cannot create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(db_path).map_err(sql_error)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::setup_db(&conn).map_err(sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn setup_db(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS inventory_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'inventory',
                item_name TEXT NOT NULL,
                quantity REAL NOT NULL DEFAULT 0,
                price REAL NOT NULL DEFAULT 0,
                month TEXT,
                UNIQUE(user_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_inventory_user ON inventory_records(user_id);
        ",
        )
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::store("inventory connection lock poisoned"))?;
            op(&guard)
        })
        .await
        .map_err(|e| Error::store(format!("inventory task failed: {e}")))?
    }

    /// Inserts a record, replacing any record with the same id for the user.
    pub async fn insert_record(&self, user_id: &str, record: InventoryRecord) -> Result<()> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO inventory_records
                    (id, user_id, source, item_name, quantity, price, month)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    user_id,
                    record.source.as_str(),
                    record.name,
                    record.quantity,
                    record.price,
                    record.month
                ],
            )
            .map_err(sql_error)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl InventoryStore for SqliteInventoryStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<InventoryRecord>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, source, item_name, quantity, price, month
                     FROM inventory_records
                     WHERE user_id = ?1
                     ORDER BY CASE source WHEN 'inventory' THEN 0 ELSE 1 END, seq",
                )
                .map_err(sql_error)?;
            let mut rows = stmt.query([&user_id]).map_err(sql_error)?;
            let mut records = Vec::new();
            while let Some(row) = rows.next().map_err(sql_error)? {
                let id: String = row.get(0).map_err(sql_error)?;
                let source: String = row.get(1).map_err(sql_error)?;
                let source = RecordSource::parse(&source).unwrap_or_else(|| {
                    warn!(
                        user_id = %user_id,
                        record_id = %id,
                        source = %source,
                        "unknown record source, treating as inventory"
                    );
                    RecordSource::default()
                });
                records.push(InventoryRecord {
                    id,
                    source,
                    name: row.get(2).map_err(sql_error)?,
                    quantity: row.get(3).map_err(sql_error)?,
                    price: row.get(4).map_err(sql_error)?,
                    month: row.get(5).map_err(sql_error)?,
                });
            }
            debug!(user_id = %user_id, records = records.len(), "inventory listed");
            Ok(records)
        })
        .await
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM inventory_records WHERE user_id = ?1",
                    [&user_id],
                    |row| row.get(0),
                )
                .map_err(sql_error)?;
            Ok(count as usize)
        })
        .await
    }
}

fn sql_error(err: rusqlite::Error) -> Error {
    Error::store(err.to_string())
}

/// In-process store, handy for embedding the service and for tests.
#[derive(Default)]
pub struct MemoryInventoryStore {
    records: RwLock<HashMap<String, Vec<InventoryRecord>>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: &str, record: InventoryRecord) {
        let mut records = self.records.write().await;
        let user_records = records.entry(user_id.to_string()).or_default();
        user_records.retain(|existing| existing.id != record.id);
        user_records.push(record);
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<InventoryRecord>> {
        let records = self.records.read().await;
        let Some(user_records) = records.get(user_id) else {
            return Ok(Vec::new());
        };
        let (mut inventory, bills): (Vec<_>, Vec<_>) = user_records
            .iter()
            .cloned()
            .partition(|record| record.source == RecordSource::Inventory);
        inventory.extend(bills);
        Ok(inventory)
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.get(user_id).map(Vec::len).unwrap_or(0))
    }
}
