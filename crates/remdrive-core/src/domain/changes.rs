//! Pending change batches and committed change results
//!
//! A [`ChangeSet`] is the in-memory, not-yet-durable diff accumulated by
//! background polling. At most one batch is being built at a time; freshly
//! detected changes are merged into any batch still awaiting commit so that
//! nothing is lost between two host requests. A [`ChangeBatch`] is what the
//! host receives once a pending batch has been committed to the store.

use serde::{Deserialize, Serialize};

use super::anchor::Anchor;
use super::entry::CachedEntry;
use super::identity::ItemId;

/// Accumulated, not-yet-committed diff awaiting the host's next poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Entries observed for the first time
    pub creates: Vec<CachedEntry>,
    /// Entries whose version fingerprint changed
    pub updates: Vec<CachedEntry>,
    /// Rows that disappeared from their container's listing
    pub deletions: Vec<CachedEntry>,
}

impl ChangeSet {
    /// Creates an empty change set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when nothing has been accumulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }

    /// Total number of accumulated changes
    #[must_use]
    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletions.len()
    }

    /// Merges another change set into this one
    ///
    /// Later observations of an item already present in the batch replace
    /// the earlier ones. Creates reconcile by `(container, name)`: until
    /// the batch commits, the store has no row for the name, so every poll
    /// cycle mints a fresh identity for it - the identity minted when the
    /// name first entered the batch is the one that survives. Updates and
    /// deletions carry store identities and reconcile by id.
    pub fn merge(&mut self, other: ChangeSet) {
        for mut create in other.creates {
            if let Some(existing) = self
                .creates
                .iter_mut()
                .find(|e| e.container_id == create.container_id && e.name == create.name)
            {
                create.id = existing.id.clone();
                *existing = create;
                continue;
            }
            self.creates.retain(|e| e.id != create.id);
            self.updates.retain(|e| e.id != create.id);
            self.creates.push(create);
        }
        for update in other.updates {
            if let Some(existing) = self.creates.iter_mut().find(|e| e.id == update.id) {
                // Still unreported as a create; fold the newer state in.
                *existing = update;
                continue;
            }
            self.updates.retain(|e| e.id != update.id);
            self.updates.push(update);
        }
        for deletion in other.deletions {
            self.creates.retain(|e| e.id != deletion.id);
            self.updates.retain(|e| e.id != deletion.id);
            if !self.deletions.iter().any(|e| e.id == deletion.id) {
                self.deletions.push(deletion);
            }
        }
    }

    /// Prepends deletions detected outside polling
    ///
    /// Synchronous delete requests surface their rows here; they take
    /// priority over any accumulated create/update for the same identity.
    pub fn prepend_deletions(&mut self, rows: Vec<CachedEntry>) {
        let mut deletions = rows;
        for existing in std::mem::take(&mut self.deletions) {
            if !deletions.iter().any(|e| e.id == existing.id) {
                deletions.push(existing);
            }
        }
        for deletion in &deletions {
            self.creates.retain(|e| e.id != deletion.id);
            self.updates.retain(|e| e.id != deletion.id);
        }
        self.deletions = deletions;
    }
}

/// The committed result handed to the host by `changes_since`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Newly created entries
    pub creates: Vec<CachedEntry>,
    /// Updated entries
    pub updates: Vec<CachedEntry>,
    /// Identities removed from the store, cascades included
    pub deletions: Vec<ItemId>,
    /// The anchor the host should resume from
    pub anchor: Anchor,
}

impl ChangeBatch {
    /// An empty batch at the given anchor
    #[must_use]
    pub fn empty(anchor: Anchor) -> Self {
        Self {
            creates: Vec::new(),
            updates: Vec::new(),
            deletions: Vec::new(),
            anchor,
        }
    }

    /// Returns true when the batch carries no changes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }
}
