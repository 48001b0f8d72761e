//! Change notifier port (driving-side signal)
//!
//! The coordinator pushes a payload-free signal whenever new changes are
//! waiting; the host reacts by calling `changes_since` with its last anchor
//! to fetch the actual payload.
//!
//! ## Design Notes
//!
//! - Fire-and-forget: delivery failures are logged by the caller and never
//!   propagated into the sync protocol.
//! - No payload by design. The anchor protocol is the only way to consume
//!   changes, which keeps "what the host has been told" in one place.

/// Port trait for the "changes available" signal
#[async_trait::async_trait]
pub trait IChangeNotifier: Send + Sync {
    /// Signals the host that new changes are waiting to be fetched
    async fn changes_available(&self) -> anyhow::Result<()>;
}
