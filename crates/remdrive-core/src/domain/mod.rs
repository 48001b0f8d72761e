//! Domain types for the sync engine
//!
//! Pure data types and naming policies with no I/O:
//! - [`identity`] - Stable item identifiers and the collision rename policy
//! - [`path`] - Remote path handling for subtree queries
//! - [`entry`] - Cached rows and remote listing DTOs
//! - [`anchor`] - The (version, iteration) change-feed token
//! - [`changes`] - Pending change batches and committed change results
//! - [`errors`] - Domain error types

pub mod anchor;
pub mod changes;
pub mod entry;
pub mod errors;
pub mod identity;
pub mod path;

pub use anchor::Anchor;
pub use changes::{ChangeBatch, ChangeSet};
pub use entry::{CachedEntry, EntryKind, ItemVersion, RemoteEntry};
pub use errors::DomainError;
pub use identity::ItemId;
pub use path::RemotePath;
