//! Port definitions (trait seams for adapters)
//!
//! - [`metadata_store`] - Persistence contract implemented by `remdrive-store`
//! - [`remote_lister`] - Remote snapshot source (SFTP/SSH transport lives
//!   behind this seam, outside this workspace)
//! - [`change_notifier`] - Payload-free "changes available" signal to the host

pub mod change_notifier;
pub mod metadata_store;
pub mod remote_lister;

pub use change_notifier::IChangeNotifier;
pub use metadata_store::IMetadataStore;
pub use remote_lister::IRemoteLister;
