//! SQLite-backed keyed store with connection pooling
//!
//! All tables share one `entities` table keyed by (table, partition, row);
//! properties are stored as a JSON document. The same database also holds
//! the message queue (see `queue::sqlite`).

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{new_etag, validate_batch, BatchAction, Entity, KeyedStore, Properties, Query};
use crate::error::{Error, Result};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Durable keyed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    db_path: String,
    encrypted: bool,
}

impl SqliteStore {
    /// Open an encrypted store
    ///
    /// Requires `TALLY_DB_KEY`. Use `new_unencrypted()` for development
    /// and tests.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} with your passphrase, \
                or set storage.encrypt = false for an unencrypted database.",
                DB_KEY_ENV
            ))),
        }
    }

    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open a store with an explicit passphrase (or none)
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let store = Self {
            pool,
            db_path: path.to_string(),
            encrypted: passphrase.is_some(),
        };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create a throwaway store (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("tally_test_{}_{}.db", std::process::id(), id));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` on a pooled connection on tokio's blocking pool.
    ///
    /// The returned future can be dropped by a deadline while `f` is still
    /// running; the statement then finishes in the background.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("Database task failed: {}", e)))?
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the worker's writes
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;

            -- Registry of created tables
            CREATE TABLE IF NOT EXISTS kv_tables (
                name TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Entities of every table
            CREATE TABLE IF NOT EXISTS entities (
                table_name TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                etag TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (table_name, partition_key, row_key)
            );

            -- Message queue
            CREATE TABLE IF NOT EXISTS queue_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                queue_name TEXT NOT NULL,
                body TEXT NOT NULL,
                dequeue_count INTEGER NOT NULL DEFAULT 0,
                visible_at INTEGER NOT NULL,
                enqueued_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_queue_visible ON queue_messages(queue_name, visible_at);
            "#,
        )?;

        info!(path = %self.db_path, "Store migrations complete");
        Ok(())
    }
}

fn require_table(conn: &rusqlite::Connection, table: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM kv_tables WHERE name = ?1", params![table], |row| row.get(0))
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(Error::NotFound(format!("table {}", table))),
    }
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(parts: (String, String, String, String)) -> Result<Entity> {
    let (partition_key, row_key, etag, data) = parts;
    let properties: Properties = serde_json::from_str(&data)?;
    Ok(Entity {
        partition_key,
        row_key,
        etag: Some(etag),
        properties,
    })
}

fn write_entity(conn: &rusqlite::Connection, table: &str, entity: &Entity) -> Result<String> {
    let etag = new_etag();
    let data = serde_json::to_string(&entity.properties)?;
    conn.execute(
        "INSERT OR REPLACE INTO entities (table_name, partition_key, row_key, etag, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)",
        params![table, entity.partition_key, entity.row_key, etag, data],
    )?;
    Ok(etag)
}

#[async_trait]
impl KeyedStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let table = table.to_string();
        self.blocking(move |conn| {
            conn.execute("INSERT OR IGNORE INTO kv_tables (name) VALUES (?1)", params![table])?;
            Ok(())
        })
        .await
    }

    async fn upsert_entity(&self, table: &str, entity: Entity) -> Result<()> {
        let table = table.to_string();
        self.blocking(move |conn| {
            require_table(conn, &table)?;
            write_entity(conn, &table, &entity)?;
            Ok(())
        })
        .await
    }

    async fn submit_batch(&self, table: &str, actions: Vec<BatchAction>) -> Result<()> {
        validate_batch(&actions)?;
        let table = table.to_string();
        self.blocking(move |conn| {
            require_table(conn, &table)?;

            let tx = conn.transaction()?;
            for action in &actions {
                match action {
                    BatchAction::Upsert(entity) => {
                        write_entity(&tx, &table, entity)?;
                    }
                    BatchAction::Delete {
                        partition_key,
                        row_key,
                    } => {
                        tx.execute(
                            "DELETE FROM entities WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                            params![table, partition_key, row_key],
                        )?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_entities(&self, table: &str, query: &Query) -> Result<Vec<Entity>> {
        let table = table.to_string();
        let query = query.clone();
        self.blocking(move |conn| {
            require_table(conn, &table)?;

            let rows: Vec<(String, String, String, String)> = match &query.partition_key {
                Some(pk) => {
                    let mut stmt = conn.prepare(
                        "SELECT partition_key, row_key, etag, data FROM entities
                         WHERE table_name = ?1 AND partition_key = ?2
                         ORDER BY partition_key, row_key",
                    )?;
                    let rows = stmt
                        .query_map(params![table, pk], row_to_entity)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT partition_key, row_key, etag, data FROM entities
                         WHERE table_name = ?1
                         ORDER BY partition_key, row_key",
                    )?;
                    let rows = stmt
                        .query_map(params![table], row_to_entity)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };

            let mut entities = Vec::with_capacity(rows.len());
            for parts in rows {
                let entity = decode(parts)?;
                if query.matches(&entity) {
                    entities.push(query.shape(entity));
                }
            }
            Ok(entities)
        })
        .await
    }

    async fn get_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>> {
        let (table, partition_key, row_key) = (table.to_string(), partition_key.to_string(), row_key.to_string());
        self.blocking(move |conn| {
            require_table(conn, &table)?;

            let parts = conn
                .query_row(
                    "SELECT partition_key, row_key, etag, data FROM entities
                     WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                    params![table, partition_key, row_key],
                    row_to_entity,
                )
                .optional()?;
            parts.map(decode).transpose()
        })
        .await
    }

    async fn update_entity(&self, table: &str, entity: Entity, if_match: Option<&str>) -> Result<String> {
        let table = table.to_string();
        let if_match = if_match.map(str::to_string);
        self.blocking(move |conn| {
            require_table(conn, &table)?;

            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT etag FROM entities WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                    params![table, entity.partition_key, entity.row_key],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(current) = current else {
                return Err(Error::NotFound(format!(
                    "{}/{}/{}",
                    table, entity.partition_key, entity.row_key
                )));
            };
            if let Some(expected) = if_match {
                if current != expected {
                    return Err(Error::PreconditionFailed(format!(
                        "{}/{}/{} was modified",
                        table, entity.partition_key, entity.row_key
                    )));
                }
            }

            let etag = write_entity(&tx, &table, &entity)?;
            tx.commit()?;
            Ok(etag)
        })
        .await
    }

    async fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        let (table, partition_key, row_key) = (table.to_string(), partition_key.to_string(), row_key.to_string());
        self.blocking(move |conn| {
            require_table(conn, &table)?;
            conn.execute(
                "DELETE FROM entities WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                params![table, partition_key, row_key],
            )?;
            Ok(())
        })
        .await
    }
}
