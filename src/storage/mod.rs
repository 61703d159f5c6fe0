//! Backup and restore of the local index directory through an object store.

pub mod archive;
pub mod client;
pub mod sync;

pub use client::ObjectStoreClient;
pub use sync::{StorageSyncManager, SyncOutcome};
