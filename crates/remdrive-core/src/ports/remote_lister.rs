//! Remote lister port (driven/secondary port)
//!
//! The single seam to the remote filesystem: given a container path, return
//! a complete snapshot of its child entries. The transport behind it (SFTP,
//! SSH exec, anything that can stat a directory) is out of scope for this
//! engine; what matters here is the contract.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific
//!   and don't need domain-level classification.
//! - A call returns a *complete, consistent* snapshot or fails; partial or
//!   streamed listings are not supported by this design.
//! - The lister is authoritative: whatever it returns is the truth the
//!   cache converges towards.

use crate::domain::entry::RemoteEntry;
use crate::domain::path::RemotePath;

/// Port trait for fetching remote directory snapshots
#[async_trait::async_trait]
pub trait IRemoteLister: Send + Sync {
    /// Lists the children of the container at `path`
    ///
    /// Returns the complete child set with name, kind, size and timestamps.
    /// Self (`.`) and parent (`..`) entries may or may not be included;
    /// callers filter reserved names either way.
    async fn list(&self, path: &RemotePath) -> anyhow::Result<Vec<RemoteEntry>>;
}
