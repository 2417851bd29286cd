//! Expiration-aware hashed blob store
//!
//! Stores byte payloads under application-chosen keys. Every record's
//! metadata (key, expiration, last update, optimized flag) is encoded into its
//! file name inside a hash-sharded directory tree, so the store can be rebuilt
//! after a restart by listing directories alone. Several versions of a key may
//! sit on disk at once; lookups surface the one expiring last and schedule the
//! rest for removal.

pub mod backend;
pub mod config;
pub mod encoder;
pub mod error;
pub mod provider;
pub mod queue;
mod types;

pub use backend::{FsStorage, StorageBackend};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use provider::{HashedStoreProvider, StoreProvider};
pub use queue::{BackgroundQueue, Task, WorkQueue};
pub use types::{from_ticks, to_ticks, ProviderStats, RecordDescriptor};
