// crates/store/src/lib.rs
//! SQLite-backed store for conversations, messages and the git correlation
//! subsystem. Owns the only live database handle; every other component
//! borrows a cloned `SqlitePool`.
#![allow(clippy::too_many_arguments)]

pub mod indexer;
mod migrations;

pub use indexer::{upsert_conversation, UpsertOutcome};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to determine the conversations.db directory")]
    NoDataDir,

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the database at the given path, apply pragmas, and
    /// run migrations.
    pub async fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("cache_size", "-65536") // >= 64 MiB page cache
            .pragma("mmap_size", "268435456") // 256 MiB memory-mapped region
            .busy_timeout(std::time::Duration::from_secs(30))
            .log_slow_statements(
                tracing::log::LevelFilter::Warn,
                std::time::Duration::from_secs(5),
            );

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            db_path: path.to_owned(),
        };
        store.run_migrations().await?;

        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database — otherwise each connection gets its own, breaking
    /// concurrent queries.
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            db_path: PathBuf::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open the database at the default location:
    /// `~/.claude/ai-memory/conversations.db`.
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::open(&path).await
    }

    /// Apply all migrations that have not yet run, tracked by a
    /// `_migrations` version table so non-idempotent `ALTER TABLE`
    /// statements execute exactly once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version <= current_version {
                continue;
            }

            match sqlx::raw_sql(migration).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {
                    // Schema already has the column from an earlier, untracked run.
                }
                Err(e) => return Err(e.into()),
            }
            sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Get a reference to the underlying connection pool. Cheap to clone —
    /// an `Arc` internally — for handing to read-only query callers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path to the database file. Empty for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Read a named counter from `index_stats`, defaulting to `0`.
    pub async fn stat(&self, name: &str) -> DbResult<i64> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM index_stats WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(v,)| v.parse().ok()).unwrap_or(0))
    }

    /// Upsert a named counter in `index_stats`.
    pub async fn set_stat(&self, name: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO index_stats (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Returns the default database path: `~/.claude/ai-memory/conversations.db`.
pub fn default_db_path() -> DbResult<PathBuf> {
    conversant_core::paths::db_path().ok_or(DbError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_expected_tables() {
        let store = Store::open_in_memory().await.expect("should open in-memory store");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(store.pool())
            .await
            .expect("conversations table should exist");
        assert_eq!(count.0, 0);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM git_repositories")
            .fetch_one(store.pool())
            .await
            .expect("git_repositories table should exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store.run_migrations().await.expect("second run should be a no-op");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn file_based_store_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("conversations.db");

        let store = Store::open(&db_path).await.expect("should create file-based store");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn stat_roundtrips_through_index_stats() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.stat("total_conversations").await.unwrap(), 0);

        store.set_stat("total_conversations", "3").await.unwrap();
        assert_eq!(store.stat("total_conversations").await.unwrap(), 3);
    }

    #[test]
    fn default_db_path_ends_with_conversations_db() {
        let path = default_db_path().unwrap();
        assert!(path.ends_with("conversations.db"));
    }
}
