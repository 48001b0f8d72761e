//! Watch-channel implementation of the change signal port
//!
//! Hosts that live in the same process subscribe to a [`tokio::sync::watch`]
//! channel; each signal bumps a generation counter. The signal carries no
//! payload by design - the host calls `changes_since` to get one.

use tokio::sync::watch;

use remdrive_core::ports::IChangeNotifier;

/// Signals "changes available" over a watch channel
pub struct WatchNotifier {
    tx: watch::Sender<u64>,
}

impl WatchNotifier {
    /// Creates a notifier with generation counter 0
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Subscribes to change signals
    ///
    /// The receiver observes a monotonically increasing generation counter;
    /// any observed increase means at least one signal fired since the last
    /// look.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for WatchNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IChangeNotifier for WatchNotifier {
    async fn changes_available(&self) -> anyhow::Result<()> {
        self.tx.send_modify(|generation| *generation += 1);
        Ok(())
    }
}
