//! Metadata store port (driven/secondary port)
//!
//! This module defines the interface for the durable working-set table: one
//! row per cached remote entry, keyed by stable identity. The store is the
//! single source of truth for "what the host has durably been told exists".
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite today) and don't need domain-level classification.
//! - Every multi-row operation is transactional: fully applied or fully
//!   rolled back, never partially visible.
//! - Operations that delete rows return the deleted rows, cascades
//!   included, so the caller can report them to the host. Deleting a row
//!   that does not exist is a no-op, not an error.

use crate::domain::entry::CachedEntry;
use crate::domain::identity::ItemId;
use crate::domain::path::RemotePath;

/// Port trait for the durable metadata store
#[async_trait::async_trait]
pub trait IMetadataStore: Send + Sync {
    // --- Lookups ---

    /// Retrieves a row by its identity
    async fn item(&self, id: &ItemId) -> anyhow::Result<Option<CachedEntry>>;

    /// Retrieves a row by name within a container
    async fn item_by_name(
        &self,
        name: &str,
        container_id: &ItemId,
    ) -> anyhow::Result<Option<CachedEntry>>;

    /// Retrieves every row whose parent is the given container
    async fn items_in(&self, container_id: &ItemId) -> anyhow::Result<Vec<CachedEntry>>;

    /// Returns true if a row with this identity exists
    async fn is_tracked(&self, id: &ItemId) -> anyhow::Result<bool>;

    /// Returns true if any row lists this container as its parent
    ///
    /// Gate for active-container registration: only containers whose
    /// contents have been enumerated at least once can be polled.
    async fn has_contents(&self, container_id: &ItemId) -> anyhow::Result<bool>;

    /// Distinct container identities present in the store
    async fn tracked_containers(&self) -> anyhow::Result<Vec<ItemId>>;

    // --- Diff-oriented writes ---

    /// Replaces a container's cached rows with a fresh full listing
    ///
    /// Deletes every previously cached row in the container whose name is
    /// absent from `fresh` (cascading into subtrees), then upserts every
    /// fresh entry. Returns exactly the rows that were deleted.
    async fn replace_container(
        &self,
        container_id: &ItemId,
        container_path: &RemotePath,
        fresh: &[CachedEntry],
    ) -> anyhow::Result<Vec<CachedEntry>>;

    /// Single-row write for targeted create/rename/attribute-update paths
    ///
    /// If a different live row occupies `(name, container_id)`, that row
    /// (and its subtree, if a container) is deleted first and returned. If
    /// the written entry is an existing container whose name or parent path
    /// changed, every descendant's `container_path` prefix is rewritten in
    /// the same transaction.
    async fn upsert(&self, entry: &CachedEntry) -> anyhow::Result<Vec<CachedEntry>>;

    /// Batched write for the committed pending-changes path
    ///
    /// Applies deletions first (cascading container subtrees), then
    /// creates, then updates, each keyed by identity. Returns the union of
    /// the declared deletions and any cascade deletions.
    async fn apply_change_set(
        &self,
        creates: &[CachedEntry],
        updates: &[CachedEntry],
        deletes: &[CachedEntry],
    ) -> anyhow::Result<Vec<CachedEntry>>;

    // --- Bootstrap ---

    /// Highest anchor iteration present in the store (0 when empty)
    async fn highest_anchor_iteration(&self) -> anyhow::Result<i64>;

    /// The store's current anchor version string
    ///
    /// Renewed whenever the store is wiped and rebuilt; anchors minted
    /// under an older version are expired.
    async fn anchor_version(&self) -> anyhow::Result<String>;
}
