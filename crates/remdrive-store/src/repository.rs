//! SQLite implementation of IMetadataStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! metadata store port defined in remdrive-core. It owns all SQL query
//! construction and the row <-> domain mapping.
//!
//! ## Type Mapping
//!
//! | Domain Type | SQL Type | Strategy                                |
//! |-------------|----------|-----------------------------------------|
//! | ItemId      | TEXT     | raw string via `as_str()` / `FromStr`   |
//! | RemotePath  | TEXT     | raw string via `as_str()` / `new()`     |
//! | ItemVersion | BLOB     | opaque bytes, compared byte-for-byte    |
//! | anchor      | INTEGER  | i64                                     |
//!
//! ## Subtree queries
//!
//! Every row stores its *parent's* full path in `container_path`, so a
//! container's whole subtree is the set of rows whose `container_path`
//! equals the container's full path or starts with it plus `/`. LIKE
//! metacharacters in paths are escaped so a name containing `%` or `_`
//! cannot widen a cascade.

use std::collections::HashSet;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use remdrive_core::domain::{
    entry::{CachedEntry, ItemVersion},
    identity::ItemId,
    path::RemotePath,
};
use remdrive_core::ports::IMetadataStore;

use crate::StoreError;

/// SQLite-based implementation of the metadata store port
///
/// All multi-row operations run inside a single SQL transaction: they are
/// fully applied or fully rolled back, and concurrent readers never observe
/// a torn cascade.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Escapes LIKE metacharacters so stored paths match literally
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '%' || c == '_' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reconstruct a CachedEntry from a database row
fn entry_from_row(row: &SqliteRow) -> Result<CachedEntry, StoreError> {
    let id_str: String = row.get("id");
    let name: String = row.get("name");
    let container_id_str: String = row.get("container_id");
    let container_path_str: String = row.get("container_path");
    let version_bytes: Vec<u8> = row.get("version");
    let is_container: bool = row.get("is_container");
    let anchor: i64 = row.get("anchor");

    let id = ItemId::from_str(&id_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid ItemId '{}': {}", id_str, e))
    })?;

    let container_id = ItemId::from_str(&container_id_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid container id '{}': {}", container_id_str, e))
    })?;

    let container_path = RemotePath::new(container_path_str.clone()).map_err(|e| {
        StoreError::SerializationError(format!(
            "Invalid container path '{}': {}",
            container_path_str, e
        ))
    })?;

    Ok(CachedEntry {
        id,
        name,
        container_id,
        container_path,
        version: ItemVersion::from_bytes(version_bytes),
        is_container,
        anchor,
    })
}

// ============================================================================
// Transactional building blocks
// ============================================================================

/// Collects and deletes every row in the subtree rooted at `path`
///
/// `path` is the full path of a container; affected rows are those whose
/// `container_path` is the path itself or lies underneath it. Returns the
/// deleted rows, deepest-last in no particular order.
async fn delete_subtree(
    tx: &mut Transaction<'_, Sqlite>,
    path: &RemotePath,
) -> Result<Vec<CachedEntry>, StoreError> {
    let pattern = format!("{}/%", escape_like(path.as_str()));

    let rows = sqlx::query(
        "SELECT * FROM state WHERE container_path = ?1 OR container_path LIKE ?2 ESCAPE '\\'",
    )
    .bind(path.as_str())
    .bind(&pattern)
    .fetch_all(&mut **tx)
    .await?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut deleted = Vec::with_capacity(rows.len());
    for row in &rows {
        let entry = entry_from_row(row)?;
        tracing::debug!(path = %entry.full_path(), "cascade delete");
        deleted.push(entry);
    }

    sqlx::query(
        "DELETE FROM state WHERE container_path = ?1 OR container_path LIKE ?2 ESCAPE '\\'",
    )
    .bind(path.as_str())
    .bind(&pattern)
    .execute(&mut **tx)
    .await?;

    Ok(deleted)
}

/// Deletes a single row, cascading into its subtree when it is a container
///
/// Returns every deleted row, the entry itself last. Deleting a row that no
/// longer exists only cascades whatever is still underneath its path.
async fn delete_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &CachedEntry,
) -> Result<Vec<CachedEntry>, StoreError> {
    let mut deleted = Vec::new();

    if entry.is_container {
        deleted.extend(delete_subtree(tx, &entry.full_path()).await?);
    }

    sqlx::query("DELETE FROM state WHERE id = ?")
        .bind(entry.id.as_str())
        .execute(&mut **tx)
        .await?;
    deleted.push(entry.clone());

    Ok(deleted)
}

/// Rewrites the `container_path` prefix of every descendant of a moved or
/// renamed container, in place
async fn move_subtree(
    tx: &mut Transaction<'_, Sqlite>,
    old_path: &RemotePath,
    new_path: &RemotePath,
) -> Result<(), StoreError> {
    let pattern = format!("{}/%", escape_like(old_path.as_str()));

    let rewritten = sqlx::query(
        "UPDATE state \
         SET container_path = ?2 || substr(container_path, length(?1) + 1) \
         WHERE container_path = ?1 OR container_path LIKE ?3 ESCAPE '\\'",
    )
    .bind(old_path.as_str())
    .bind(new_path.as_str())
    .bind(&pattern)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        old = %old_path,
        new = %new_path,
        rows = rewritten.rows_affected(),
        "moved subtree"
    );
    Ok(())
}

/// Inserts or replaces one row
async fn write_row(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &CachedEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT OR REPLACE INTO state \
         (id, name, container_id, container_path, version, is_container, anchor) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.as_str())
    .bind(&entry.name)
    .bind(entry.container_id.as_str())
    .bind(entry.container_path.as_str())
    .bind(entry.version.as_bytes())
    .bind(entry.is_container)
    .bind(entry.anchor)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Evicts a live row occupying `(name, container_id)` under a different
/// identity, cascading if it is a container. No-op when the slot is free or
/// held by `id` itself.
async fn evict_name_collision(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    container_id: &ItemId,
    id: &ItemId,
) -> Result<Vec<CachedEntry>, StoreError> {
    let row = sqlx::query("SELECT * FROM state WHERE name = ? AND container_id = ?")
        .bind(name)
        .bind(container_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

    let Some(row) = row else {
        return Ok(Vec::new());
    };

    let existing = entry_from_row(&row)?;
    if existing.id == *id {
        return Ok(Vec::new());
    }

    tracing::debug!(
        name = name,
        loser = %existing.id,
        winner = %id,
        "name collision, evicting previous row"
    );
    delete_entry(tx, &existing).await
}

// ============================================================================
// IMetadataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetadataStore for SqliteMetadataStore {
    async fn item(&self, id: &ItemId) -> anyhow::Result<Option<CachedEntry>> {
        let row = sqlx::query("SELECT * FROM state WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn item_by_name(
        &self,
        name: &str,
        container_id: &ItemId,
    ) -> anyhow::Result<Option<CachedEntry>> {
        let row = sqlx::query("SELECT * FROM state WHERE name = ? AND container_id = ?")
            .bind(name)
            .bind(container_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn items_in(&self, container_id: &ItemId) -> anyhow::Result<Vec<CachedEntry>> {
        let rows = sqlx::query("SELECT * FROM state WHERE container_id = ?")
            .bind(container_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(entry_from_row(row)?);
        }

        Ok(entries)
    }

    async fn is_tracked(&self, id: &ItemId) -> anyhow::Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM state WHERE id = ?")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn has_contents(&self, container_id: &ItemId) -> anyhow::Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM state WHERE container_id = ?")
            .bind(container_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn tracked_containers(&self) -> anyhow::Result<Vec<ItemId>> {
        let rows = sqlx::query("SELECT DISTINCT container_id FROM state")
            .fetch_all(&self.pool)
            .await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = row.get("container_id");
            let id = ItemId::from_str(&raw).map_err(|e| {
                StoreError::SerializationError(format!("Invalid container id '{}': {}", raw, e))
            })?;
            ids.push(id);
        }

        Ok(ids)
    }

    async fn replace_container(
        &self,
        container_id: &ItemId,
        container_path: &RemotePath,
        fresh: &[CachedEntry],
    ) -> anyhow::Result<Vec<CachedEntry>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT * FROM state WHERE container_id = ?")
            .bind(container_id.as_str())
            .fetch_all(&mut *tx)
            .await?;

        let mut cached = Vec::with_capacity(rows.len());
        for row in &rows {
            cached.push(entry_from_row(row)?);
        }

        let fresh_names: HashSet<&str> = fresh.iter().map(|e| e.name.as_str()).collect();

        // Pass 1: drop every cached row no longer present in the listing.
        let mut deleted = Vec::new();
        for entry in &cached {
            if !fresh_names.contains(entry.name.as_str()) {
                deleted.extend(delete_entry(&mut tx, entry).await?);
            }
        }

        // Pass 2: upsert the fresh set, evicting any row whose name is now
        // claimed by a different identity.
        for entry in fresh {
            deleted
                .extend(evict_name_collision(&mut tx, &entry.name, &entry.container_id, &entry.id).await?);
            write_row(&mut tx, entry).await?;
        }

        tx.commit().await?;

        tracing::trace!(
            container = %container_path,
            fresh = fresh.len(),
            deleted = deleted.len(),
            "replaced container"
        );
        Ok(deleted)
    }

    async fn upsert(&self, entry: &CachedEntry) -> anyhow::Result<Vec<CachedEntry>> {
        let mut tx = self.pool.begin().await?;

        let deleted =
            evict_name_collision(&mut tx, &entry.name, &entry.container_id, &entry.id).await?;

        // A container being renamed or reparented drags its subtree along:
        // every descendant's container_path prefix is rewritten in the same
        // transaction.
        let previous = sqlx::query("SELECT * FROM state WHERE id = ?")
            .bind(entry.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(ref row) = previous {
            let previous = entry_from_row(row)?;
            if previous.is_container
                && (previous.container_path != entry.container_path
                    || previous.name != entry.name)
            {
                move_subtree(&mut tx, &previous.full_path(), &entry.full_path()).await?;
            }
        }

        write_row(&mut tx, entry).await?;

        tx.commit().await?;

        tracing::trace!(id = %entry.id, path = %entry.full_path(), "upserted item");
        Ok(deleted)
    }

    async fn apply_change_set(
        &self,
        creates: &[CachedEntry],
        updates: &[CachedEntry],
        deletes: &[CachedEntry],
    ) -> anyhow::Result<Vec<CachedEntry>> {
        let mut tx = self.pool.begin().await?;

        // Deletions first so a rename committed as delete+create never
        // transiently violates name uniqueness.
        let mut deleted = Vec::new();
        for entry in deletes {
            deleted.extend(delete_entry(&mut tx, entry).await?);
        }

        for entry in creates {
            write_row(&mut tx, entry).await?;
        }

        for entry in updates {
            sqlx::query(
                "UPDATE state \
                 SET name = ?, container_id = ?, container_path = ?, \
                     version = ?, is_container = ?, anchor = ? \
                 WHERE id = ?",
            )
            .bind(&entry.name)
            .bind(entry.container_id.as_str())
            .bind(entry.container_path.as_str())
            .bind(entry.version.as_bytes())
            .bind(entry.is_container)
            .bind(entry.anchor)
            .bind(entry.id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(
            creates = creates.len(),
            updates = updates.len(),
            deletes = deletes.len(),
            cascades = deleted.len().saturating_sub(deletes.len()),
            "applied change set"
        );
        Ok(deleted)
    }

    async fn highest_anchor_iteration(&self) -> anyhow::Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(anchor) FROM state")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    async fn anchor_version(&self) -> anyhow::Result<String> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM metadata WHERE key = 'anchor_version'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or_default())
    }
}
