use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::GameRecord;
use crate::error::{EngineError, Result};
use crate::refresh::RefreshState;
use crate::store::{CheckpointStore, GameRecordStore, ImageCache};

/// SQLite-backed game library and refresh checkpoint.
///
/// Schema:
/// ```sql
/// CREATE TABLE games (
///     id TEXT PRIMARY KEY,
///     position INTEGER NOT NULL,
///     data TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// CREATE TABLE refresh_checkpoint (
///     id INTEGER PRIMARY KEY CHECK (id = 1),
///     state TEXT NOT NULL,
///     saved_at TEXT NOT NULL
/// );
/// ```
/// `position` fixes library order; a record keeps its position across saves.
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    image_cache: Option<Arc<dyn ImageCache>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `db_path`. `":memory:"` works for tests.
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_games_position ON games(position)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS refresh_checkpoint (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
            [],
        )?;

        tracing::debug!("Opened game library at {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            image_cache: None,
        })
    }

    /// Evict stale cached artwork through `cache` when asset URLs change.
    pub fn with_image_cache(mut self, cache: Arc<dyn ImageCache>) -> Self {
        self.image_cache = Some(cache);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::persistence("library database lock poisoned"))
    }

    /// Add or replace a record without eviction.
    pub async fn insert(&self, record: &GameRecord) -> Result<()> {
        self.write(record)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn write(&self, record: &GameRecord) -> Result<()> {
        let now = Utc::now();
        let mut stored = record.clone();
        stored.updated_at = Some(now);
        let data = serde_json::to_string(&stored)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO games (id, position, data, updated_at)
             VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM games), ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![record.id, data, now.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl GameRecordStore for SqliteRecordStore {
    async fn get_all(&self) -> Result<Vec<GameRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM games ORDER BY position ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<GameRecord>> {
        let data: Option<String> = {
            let conn = self.lock()?;
            conn.query_row("SELECT data FROM games WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()?
        };

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &GameRecord, previous: Option<&GameRecord>) -> Result<()> {
        self.write(record)?;

        if let (Some(previous), Some(cache)) = (previous, &self.image_cache) {
            for kind in record.artwork.changed_kinds(&previous.artwork) {
                let replaced_by_cache = record.artwork.get(kind).is_some_and(|url| cache.owns(url));
                if !replaced_by_cache {
                    tracing::debug!("Evicting cached {} for {}", kind, record.id);
                    cache.delete_cached_image(&record.id, kind).await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteRecordStore {
    async fn load_checkpoint(&self) -> Result<Option<RefreshState>> {
        let data: Option<String> = {
            let conn = self.lock()?;
            conn.query_row("SELECT state FROM refresh_checkpoint WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?
        };

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_checkpoint(&self, state: &RefreshState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO refresh_checkpoint (id, state, saved_at) VALUES (1, ?1, ?2)",
            params![json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM refresh_checkpoint", [])?;
        Ok(())
    }
}
