//! SQLite Persistent Storage for Withdraw Links
//!
//! Provides durable storage for links that survives service restarts.
//! Uses connection pooling via r2d2 for concurrent access.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{LinkStore, StorageError, StorageResult};
use crate::types::link::{UseState, WithdrawLink};

/// SQLite-backed link store with connection pooling
pub struct SqliteLinkStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLinkStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS withdraw_links (
                id TEXT PRIMARY KEY,
                link_hash TEXT NOT NULL UNIQUE,
                k1 TEXT NOT NULL,
                wallet_id TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                min_sats INTEGER NOT NULL,
                max_sats INTEGER NOT NULL,
                total_uses INTEGER NOT NULL,
                cooldown_secs INTEGER NOT NULL DEFAULT 0,
                used_count INTEGER NOT NULL DEFAULT 0,
                use_markers TEXT NOT NULL DEFAULT '',
                next_eligible_at INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_withdraw_links_hash ON withdraw_links(link_hash);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    /// Convert a database row to WithdrawLink
    fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<WithdrawLink> {
        let markers: String = row.get("use_markers")?;
        let use_markers = UseState::parse_markers(&markers).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(WithdrawLink {
            id: row.get("id")?,
            link_hash: row.get("link_hash")?,
            k1: row.get("k1")?,
            wallet_id: row.get("wallet_id")?,
            description: row.get("description")?,
            min_sats: row.get::<_, i64>("min_sats")? as u64,
            max_sats: row.get::<_, i64>("max_sats")? as u64,
            total_uses: row.get::<_, i64>("total_uses")? as u32,
            cooldown_secs: row.get::<_, i64>("cooldown_secs")? as u64,
            used_count: row.get::<_, i64>("used_count")? as u32,
            use_markers,
            next_eligible_at: row.get("next_eligible_at")?,
        })
    }

    // Synchronous helper methods for the trait implementations

    fn insert_sync(&self, link: &WithdrawLink) -> Result<(), StorageError> {
        link.validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO withdraw_links (
                id, link_hash, k1, wallet_id, description,
                min_sats, max_sats, total_uses, cooldown_secs,
                used_count, use_markers, next_eligible_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12
            )
            "#,
            params![
                link.id,
                link.link_hash,
                link.k1,
                link.wallet_id,
                link.description,
                link.min_sats as i64,
                link.max_sats as i64,
                link.total_uses as i64,
                link.cooldown_secs as i64,
                link.used_count as i64,
                link.state().markers_csv(),
                link.next_eligible_at,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(link.link_hash.clone());
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(())
    }

    fn get_one_sync(&self, column: &str, value: &str) -> Result<Option<WithdrawLink>, StorageError> {
        let conn = self.conn()?;

        let sql = format!("SELECT * FROM withdraw_links WHERE {} = ?1", column);
        let link = conn
            .query_row(&sql, params![value], |row| Self::row_to_link(row))
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(link)
    }

    fn compare_and_swap_sync(
        &self,
        id: &str,
        expected: &UseState,
        next: &UseState,
    ) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE withdraw_links SET
                used_count = ?2,
                use_markers = ?3,
                next_eligible_at = ?4
            WHERE id = ?1
                AND used_count = ?5
                AND use_markers = ?6
                AND next_eligible_at = ?7
            "#,
                params![
                    id,
                    next.used_count as i64,
                    next.markers_csv(),
                    next.next_eligible_at,
                    expected.used_count as i64,
                    expected.markers_csv(),
                    expected.next_eligible_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows_affected == 1 {
            return Ok(true);
        }

        // Distinguish a stale expectation from a missing row
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM withdraw_links WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if exists {
            Ok(false)
        } else {
            Err(StorageError::NotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn insert(&self, link: &WithdrawLink) -> StorageResult<()> {
        self.insert_sync(link)
    }

    async fn get_by_hash(&self, link_hash: &str) -> StorageResult<Option<WithdrawLink>> {
        self.get_one_sync("link_hash", link_hash)
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<WithdrawLink>> {
        self.get_one_sync("id", id)
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: &UseState,
        next: &UseState,
    ) -> StorageResult<bool> {
        self.compare_and_swap_sync(id, expected, next)
    }
}
