//! Bounded rotation of active containers
//!
//! Active containers are the ones a host currently has open, where changes
//! are likely to happen, so they are kept under background polling. The set
//! is bounded: polling cost must not grow with however many views a host
//! has opened over time. When the bound is hit, the oldest registration is
//! evicted - bounded resource use beats background freshness for containers
//! nobody has looked at in a while.
//!
//! The coordinator owns this struct and only touches it from its serialized
//! mutation context, so there is no internal locking.

use remdrive_core::domain::identity::ItemId;
use std::collections::VecDeque;

use crate::fetcher::ContainerRef;

/// Maximum number of containers kept under background polling.
pub const MAX_ACTIVE_CONTAINERS: usize = 5;

/// FIFO rotation of the containers being background-polled
#[derive(Debug, Default)]
pub struct PollCoordinator {
    active: VecDeque<ContainerRef>,
}

impl PollCoordinator {
    /// Creates an empty rotation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container for background polling
    ///
    /// Idempotent: re-registering a container already in the rotation keeps
    /// its original position. When the rotation is full, the
    /// oldest-registered container is evicted to make room.
    pub fn register(&mut self, container: ContainerRef) {
        if self.active.iter().any(|c| c.id == container.id) {
            return;
        }

        if self.active.len() == MAX_ACTIVE_CONTAINERS {
            if let Some(evicted) = self.active.pop_front() {
                tracing::debug!(container = %evicted.path, "rotating out oldest active container");
            }
        }

        tracing::debug!(container = %container.path, "registered active container");
        self.active.push_back(container);
    }

    /// Removes a container from the rotation; unknown ids are a no-op
    pub fn unregister(&mut self, id: &ItemId) {
        self.active.retain(|c| c.id != *id);
    }

    /// Returns true if the container is currently in the rotation
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.active.iter().any(|c| c.id == *id)
    }

    /// Snapshot of the rotation, oldest registration first
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContainerRef> {
        self.active.iter().cloned().collect()
    }

    /// Number of containers currently in the rotation
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns true when nothing is being polled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
