// crates/clinote-db/src/lib.rs
//! Persistence gateway and recovery operations.
//!
//! Wraps a SQLite connection pool: WAL journal mode, a migration-tracking
//! table, and an in-memory constructor for tests.

mod migrations;
pub mod queries;
mod retry;

pub use retry::{is_transient, with_retry};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

pub use queries::batch::BatchResult;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("transient store error after retries: {0}")]
    Transient(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database at `path` and runs migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// In-memory database for tests. `shared_cache(true)` so every pooled
    /// connection sees the same database.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn open_default() -> DbResult<Self> {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(&base.join("clinote").join("clinote.db")).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Runs pending migrations tracked via `_migrations`, guarding
    /// non-idempotent `ALTER TABLE` statements from re-running.
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
            let result = sqlx::raw_sql(migration).execute(&self.pool).await;
            match result {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {}
                Err(e) => return Err(e.into()),
            }
            sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_run_on_in_memory_db() {
        let db = Database::new_in_memory().await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"mentions"));
        assert!(names.contains(&"patients"));
        assert!(names.contains(&"notes"));
        assert!(names.contains(&"dictionary"));
        assert!(names.contains(&"jobs"));
        assert!(names.contains(&"process_status"));
        assert!(names.contains(&"upload_tracking"));
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
    }
}
