//! Container fetch, identity resolution and provisional diffing
//!
//! A [`ContainerFetcher`] turns one remote listing into store-ready rows:
//! it drops reserved names, reuses the stable identity of every entry the
//! cache has seen before under the same name, and mints fresh identities
//! for the rest. The same resolved rows feed two paths:
//!
//! - the enumeration path writes them through `replace_container`;
//! - the polling path diffs them against the cached rows *without writing*,
//!   producing the provisional change set merged into the pending batch.

use std::sync::Arc;

use remdrive_core::domain::changes::ChangeSet;
use remdrive_core::domain::entry::{CachedEntry, RemoteEntry};
use remdrive_core::domain::identity::ItemId;
use remdrive_core::domain::path::RemotePath;
use remdrive_core::ports::{IMetadataStore, IRemoteLister};

/// Prefix for the engine's own temporary files, never surfaced to the host.
const TMP_NAME_PREFIX: &str = ".remdrive.tmp.";

/// A resolved reference to a container: identity plus full remote path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    /// The container's stable identity
    pub id: ItemId,
    /// The container's full path on the remote
    pub path: RemotePath,
}

impl ContainerRef {
    /// The root container
    #[must_use]
    pub fn root() -> Self {
        Self {
            id: ItemId::root(),
            path: RemotePath::root(),
        }
    }
}

/// Returns true for names that never enter the cache
///
/// `.` would be seen as a container by the host and can recurse into
/// itself; `..` escapes the subtree; the temp prefix is internal plumbing.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name == "." || name == ".." || name.starts_with(TMP_NAME_PREFIX)
}

/// Resolves a fresh listing into store-ready rows for one container
///
/// Reserved names are dropped. An entry whose name matches a cached row
/// keeps that row's identity; anything else gets a newly minted one
/// (symlink-tagged where the listing says so). Rows are stamped with the
/// given anchor iteration.
#[must_use]
pub fn resolve_listing(
    container: &ContainerRef,
    cached: &[CachedEntry],
    listing: &[RemoteEntry],
    anchor: i64,
) -> Vec<CachedEntry> {
    listing
        .iter()
        .filter(|entry| {
            if is_reserved_name(&entry.name) {
                return false;
            }
            if entry.name.contains('/') {
                // A listing snapshot should never produce these; skip
                // rather than corrupt path prefixes downstream.
                tracing::warn!(name = %entry.name, "skipping listing entry with '/' in name");
                return false;
            }
            true
        })
        .map(|entry| {
            let id = cached
                .iter()
                .find(|row| row.name == entry.name)
                .map(|row| row.id.clone())
                .unwrap_or_else(|| ItemId::generate(entry.kind.is_symlink()));

            CachedEntry {
                id,
                name: entry.name.clone(),
                container_id: container.id.clone(),
                container_path: container.path.clone(),
                version: entry.version(),
                is_container: entry.is_container(),
                anchor,
            }
        })
        .collect()
}

/// Diffs resolved rows against the cached rows of the same container
///
/// Produces the provisional change set for a poll tick: creates are names
/// the cache has never seen, updates are cached names whose version bytes
/// differ, deletions are cached rows absent from the listing. Nothing is
/// written; the store only changes when the batch is committed.
#[must_use]
pub fn diff_listing(cached: &[CachedEntry], fresh: &[CachedEntry]) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for entry in fresh {
        match cached.iter().find(|row| row.name == entry.name) {
            None => changes.creates.push(entry.clone()),
            Some(row) if row.version != entry.version => changes.updates.push(entry.clone()),
            Some(_) => {}
        }
    }

    for row in cached {
        if !fresh.iter().any(|entry| entry.name == row.name) {
            changes.deletions.push(row.clone());
        }
    }

    changes
}

/// Fetches container listings and resolves them against the store
#[derive(Clone)]
pub struct ContainerFetcher {
    store: Arc<dyn IMetadataStore>,
    lister: Arc<dyn IRemoteLister>,
}

impl ContainerFetcher {
    /// Creates a fetcher over the given store and lister
    pub fn new(store: Arc<dyn IMetadataStore>, lister: Arc<dyn IRemoteLister>) -> Self {
        Self { store, lister }
    }

    /// Fetches one container's listing and resolves identities
    ///
    /// Returns `(cached, fresh)`: the rows the store currently holds for
    /// the container and the resolved rows from the live listing.
    pub async fn fetch_resolved(
        &self,
        container: &ContainerRef,
        anchor: i64,
    ) -> anyhow::Result<(Vec<CachedEntry>, Vec<CachedEntry>)> {
        let cached = self.store.items_in(&container.id).await?;
        let listing = self.lister.list(&container.path).await?;
        tracing::debug!(
            container = %container.path,
            cached = cached.len(),
            listed = listing.len(),
            "fetched container listing"
        );

        let fresh = resolve_listing(container, &cached, &listing, anchor);
        Ok((cached, fresh))
    }

    /// Fetches a container and computes its provisional diff without writing
    pub async fn fetch_diff(
        &self,
        container: &ContainerRef,
        anchor: i64,
    ) -> anyhow::Result<ChangeSet> {
        let (cached, fresh) = self.fetch_resolved(container, anchor).await?;
        Ok(diff_listing(&cached, &fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remdrive_core::domain::entry::{EntryKind, ItemVersion};

    fn remote(name: &str, kind: EntryKind) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            kind,
            size: Some(10),
            modified: None,
        }
    }

    fn cached_row(container: &ContainerRef, name: &str, version: &[u8]) -> CachedEntry {
        CachedEntry {
            id: ItemId::generate(false),
            name: name.to_string(),
            container_id: container.id.clone(),
            container_path: container.path.clone(),
            version: ItemVersion::from_bytes(version.to_vec()),
            is_container: false,
            anchor: 0,
        }
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name("."));
        assert!(is_reserved_name(".."));
        assert!(is_reserved_name(".remdrive.tmp.upload-1"));
        assert!(!is_reserved_name(".hidden"));
        assert!(!is_reserved_name("normal.txt"));
    }

    #[test]
    fn test_resolve_filters_reserved_and_slashes() {
        let root = ContainerRef::root();
        let listing = vec![
            remote(".", EntryKind::Directory),
            remote("..", EntryKind::Directory),
            remote("a.txt", EntryKind::File),
            remote("bad/name", EntryKind::File),
        ];
        let resolved = resolve_listing(&root, &[], &listing, 1);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "a.txt");
        assert_eq!(resolved[0].anchor, 1);
    }

    #[test]
    fn test_resolve_reuses_cached_identity() {
        let root = ContainerRef::root();
        let row = cached_row(&root, "a.txt", b"1");
        let listing = vec![remote("a.txt", EntryKind::File), remote("b.txt", EntryKind::File)];

        let resolved = resolve_listing(&root, &[row.clone()], &listing, 2);
        let a = resolved.iter().find(|e| e.name == "a.txt").unwrap();
        let b = resolved.iter().find(|e| e.name == "b.txt").unwrap();

        assert_eq!(a.id, row.id);
        assert_ne!(b.id, row.id);
    }

    #[test]
    fn test_resolve_tags_symlinks() {
        let root = ContainerRef::root();
        let listing = vec![remote(
            "link",
            EntryKind::Symlink {
                target_is_directory: true,
            },
        )];
        let resolved = resolve_listing(&root, &[], &listing, 0);
        assert!(resolved[0].id.is_symlink());
        assert!(resolved[0].is_container);
    }

    #[test]
    fn test_diff_classifies_changes() {
        let root = ContainerRef::root();
        let unchanged = cached_row(&root, "same.txt", b"0");
        let updated_old = cached_row(&root, "changed.txt", b"1");
        let deleted = cached_row(&root, "gone.txt", b"1");

        let mut updated_new = updated_old.clone();
        updated_new.version = ItemVersion::from_bytes(b"2".to_vec());
        let created = cached_row(&root, "new.txt", b"1");

        let cached = vec![unchanged.clone(), updated_old, deleted.clone()];
        let fresh = vec![unchanged, updated_new.clone(), created.clone()];

        let diff = diff_listing(&cached, &fresh);
        assert_eq!(diff.creates.len(), 1);
        assert_eq!(diff.creates[0].id, created.id);
        assert_eq!(diff.updates.len(), 1);
        assert_eq!(diff.updates[0].id, updated_new.id);
        assert_eq!(diff.deletions.len(), 1);
        assert_eq!(diff.deletions[0].id, deleted.id);
    }

    #[test]
    fn test_diff_empty_on_identical_sets() {
        let root = ContainerRef::root();
        let rows = vec![cached_row(&root, "a", b"1"), cached_row(&root, "b", b"2")];
        let diff = diff_listing(&rows, &rows);
        assert!(diff.is_empty());
    }
}
