//! Remdrive Sync - Anchor-based change-feed coordinator
//!
//! Provides:
//! - The anchor protocol handed to the sync host (`current_anchor` /
//!   `changes_since`)
//! - Container enumeration with identity resolution
//! - Bounded background polling of active containers
//! - Targeted single-item commits with collision renaming
//!
//! ## Modules
//!
//! - [`coordinator`] - The [`SyncCoordinator`](coordinator::SyncCoordinator)
//!   state machine; owns the pending batch and serializes all mutations
//! - [`fetcher`] - Listing fetch, reserved-name filtering, identity
//!   resolution and the provisional no-write diff
//! - [`poll`] - Bounded FIFO rotation of active containers
//! - [`notify`] - Watch-channel implementation of the change signal port

pub mod coordinator;
pub mod fetcher;
pub mod notify;
pub mod poll;

pub use coordinator::SyncCoordinator;
pub use fetcher::ContainerRef;
pub use notify::WatchNotifier;

use remdrive_core::domain::{Anchor, DomainError, ItemId};
use thiserror::Error;

/// Errors surfaced to the sync host
#[derive(Debug, Error)]
pub enum SyncError {
    /// The requested anchor can no longer be served; the host must discard
    /// its state and re-enumerate from the root. This is the only error in
    /// the protocol that is recoverable by resync.
    #[error("Anchor expired: requested {requested}, current {current}")]
    AnchorExpired {
        /// The anchor the host asked about
        requested: Anchor,
        /// The coordinator's current anchor
        current: Anchor,
    },

    /// The identified container is not tracked in the store
    #[error("No such container: {0}")]
    NoSuchContainer(ItemId),

    /// The identified item is not tracked in the store
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    /// A remote listing could not be fetched
    #[error("Fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    /// A metadata store operation failed; nothing was applied
    #[error("Store operation failed: {0}")]
    Store(#[source] anyhow::Error),

    /// A domain-level error propagated from remdrive-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}
