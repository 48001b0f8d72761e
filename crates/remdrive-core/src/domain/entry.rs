//! Cached rows and remote listing DTOs
//!
//! [`RemoteEntry`] is the port-level DTO produced by the remote lister; the
//! sync layer resolves identities and turns it into a [`CachedEntry`], the
//! row shape persisted by the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::ItemId;
use super::path::RemotePath;

// ============================================================================
// Version fingerprint
// ============================================================================

/// Opaque content/metadata fingerprint for change detection
///
/// Derived from the remote modification timestamp. Comparison is byte
/// equality only: any difference, even a single timestamp tick, means
/// "changed". There is no ordering and no fuzzy matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemVersion(Vec<u8>);

impl ItemVersion {
    /// Builds a fingerprint from a modification timestamp
    ///
    /// Missing timestamps fingerprint as epoch zero, so two entries without
    /// timestamps compare equal until the remote starts reporting them.
    #[must_use]
    pub fn from_modified(modified: Option<DateTime<Utc>>) -> Self {
        let millis = modified.map(|dt| dt.timestamp_millis()).unwrap_or(0);
        Self(millis.to_string().into_bytes())
    }

    /// Wraps raw fingerprint bytes read back from the store
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw fingerprint bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// Remote listing DTO
// ============================================================================

/// Kind of a remote entry as reported by the lister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link; attributes describe the link target
    Symlink {
        /// Whether the link target is a directory
        target_is_directory: bool,
    },
}

impl EntryKind {
    /// Returns true when the entry enumerates as a container
    ///
    /// A symlink pointing at a directory behaves as a container for
    /// enumeration purposes, matching how the remote listing reports the
    /// target's attributes under the link's name.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            EntryKind::Directory
                | EntryKind::Symlink {
                    target_is_directory: true
                }
        )
    }

    /// Returns true for symbolic links
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        matches!(self, EntryKind::Symlink { .. })
    }
}

/// A single entry from a remote listing snapshot
///
/// This is a port-level DTO: raw data from the remote lister with no
/// identity attached. The fetcher resolves it against the cached rows of
/// its container to produce a [`CachedEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Display name within the listed container
    pub name: String,
    /// File, directory or symlink
    pub kind: EntryKind,
    /// Size in bytes (None for directories)
    pub size: Option<u64>,
    /// Last modification timestamp, if the remote reports one
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// The change-detection fingerprint for this entry
    #[must_use]
    pub fn version(&self) -> ItemVersion {
        ItemVersion::from_modified(self.modified)
    }

    /// Returns true when the entry enumerates as a container
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }
}

// ============================================================================
// Store row
// ============================================================================

/// A row in the metadata store
///
/// `container_path` is the full path of the *parent* container, not of the
/// entry itself; subtree queries (cascade deletes, rename propagation) are
/// prefix matches over this column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Stable identity, primary key
    pub id: ItemId,
    /// Current display name within the container
    pub name: String,
    /// Parent container's identity
    pub container_id: ItemId,
    /// Full path of the parent container
    pub container_path: RemotePath,
    /// Change-detection fingerprint
    pub version: ItemVersion,
    /// Whether this entry is itself a container
    pub is_container: bool,
    /// Anchor iteration at which this row was last written
    pub anchor: i64,
}

impl CachedEntry {
    /// Full path of this entry on the remote
    #[must_use]
    pub fn full_path(&self) -> RemotePath {
        self.container_path.child(&self.name)
    }

    /// Returns a copy stamped with a different anchor iteration
    #[must_use]
    pub fn at_anchor(&self, anchor: i64) -> Self {
        Self {
            anchor,
            ..self.clone()
        }
    }
}
