//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - A schema-version gate: `PRAGMA user_version` is compared against the
//!   compiled [`SCHEMA_VERSION`]; any mismatch wipes and rebuilds the store
//!   and renews the anchor version, expiring every previously issued anchor
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use remdrive_core::domain::anchor::generate_anchor_version;

use crate::StoreError;

/// Compiled schema/content version. Bumping it forces a wipe-and-rebuild on
/// the next open; there are no partial migrations.
pub const SCHEMA_VERSION: i64 = 1;

/// Manages a pool of SQLite connections for the working-set store
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
pub struct StorePool {
    pool: SqlitePool,
}

impl StorePool {
    /// Opens (or creates) the store at the given file path
    ///
    /// This will:
    /// 1. Create parent directories if they don't exist
    /// 2. Create the database file if it doesn't exist
    /// 3. Enable WAL journal mode
    /// 4. Compare `PRAGMA user_version` against [`SCHEMA_VERSION`] and wipe
    ///    and rebuild the schema on any mismatch (renewing the anchor
    ///    version)
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection cannot be
    /// established, or `StoreError::MigrationFailed` if the schema cannot
    /// be built.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        Self::open_with_reset(db_path, false).await
    }

    /// Opens the store, optionally forcing a wipe-and-rebuild
    ///
    /// A forced reset behaves exactly like a schema-version mismatch: all
    /// rows are dropped and a fresh anchor version is generated.
    pub async fn open_with_reset(db_path: &Path, reset: bool) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let stored_version = Self::stored_schema_version(&pool).await?;
        if reset || stored_version != SCHEMA_VERSION {
            tracing::info!(
                stored = stored_version,
                expected = SCHEMA_VERSION,
                forced = reset,
                "Store version changed, rebuilding"
            );
            Self::rebuild_schema(&pool).await?;
        }

        tracing::info!(path = %db_path.display(), "Store pool initialized");

        Ok(Self { pool })
    }

    /// Creates an in-memory store pool for testing
    ///
    /// Uses a single connection to ensure data persistence across queries
    /// (SQLite in-memory databases are per-connection). The schema is always
    /// freshly built.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection cannot be
    /// established, or `StoreError::MigrationFailed` if the schema cannot
    /// be built.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::rebuild_schema(&pool).await?;

        tracing::debug!("In-memory store pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn stored_schema_version(pool: &SqlitePool) -> Result<i64, StoreError> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(StoreError::from)?;
        Ok(row.get::<i64, _>(0))
    }

    /// Drops and recreates the schema, then seeds a fresh anchor version
    ///
    /// Never a partial migration: a version mismatch always rebuilds from
    /// scratch, and every anchor issued against the old content expires with
    /// the renewed anchor version.
    async fn rebuild_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::raw_sql("DROP TABLE IF EXISTS state; DROP TABLE IF EXISTS metadata;")
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("Failed to drop old schema: {}", e)))?;

        let migration_sql = include_str!("migrations/001_working_set.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("Failed to build schema: {}", e)))?;

        sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(pool)
            .await
            .map_err(|e| {
                StoreError::MigrationFailed(format!("Failed to set schema version: {}", e))
            })?;

        let anchor_version = generate_anchor_version();
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('anchor_version', ?)")
            .bind(&anchor_version)
            .execute(pool)
            .await
            .map_err(|e| {
                StoreError::MigrationFailed(format!("Failed to seed anchor version: {}", e))
            })?;

        tracing::debug!(anchor_version = %anchor_version, "Store schema rebuilt");
        Ok(())
    }
}
