//! Hashed storage provider
//!
//! Records are spread over shard directories by key hash, with all metadata
//! in the file names. Reads run on the caller; every mutation is handed to a
//! [`WorkQueue`] and never reports failure back to the caller.

use crate::backend::{FsStorage, StorageBackend};
use crate::config::StoreConfig;
use crate::encoder::{
    decode_file_name, encode_file_name, ensure_path, is_shard_directory, record_path,
    shard_directory, shard_hash, CACHE_DIRECTORY_NAME, MAX_FILE_NAME_BYTES,
};
use crate::error::Result;
use crate::queue::{BackgroundQueue, WorkQueue};
use crate::types::{ProviderStats, RecordDescriptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Uniform contract shared by record store backends.
///
/// Read-side calls never fail: storage errors are reported as "not found" or
/// an empty listing. `write`, `delete` and `delete_all` only schedule work and
/// return immediately; a later read may or may not observe their effect.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Whether writes are held in memory until [`StoreProvider::flush`]
    fn is_buffered(&self) -> bool;

    /// Every decodable record in the store, duplicates included
    async fn enumerate_all(&self) -> Vec<RecordDescriptor>;

    /// The current winner for `unique_name`, as a zero or one element list
    async fn enumerate(&self, unique_name: &str) -> Vec<RecordDescriptor>;

    async fn get_latest(&self, unique_name: &str) -> Option<RecordDescriptor> {
        self.enumerate(unique_name).await.into_iter().next()
    }

    /// Payload of the record described by `descriptor`, if it can be read
    async fn read(&self, descriptor: &RecordDescriptor) -> Option<Vec<u8>>;

    fn write(&self, descriptor: RecordDescriptor, data: Vec<u8>);

    fn delete(&self, descriptor: &RecordDescriptor);

    /// Remove every stored version of `unique_name`
    fn delete_all(&self, unique_name: &str);

    fn flush(&self, synchronous: bool);
}

#[derive(Default)]
struct Counters {
    latest_hits: AtomicU64,
    latest_misses: AtomicU64,
    writes_committed: AtomicU64,
    writes_dropped: AtomicU64,
    superseded_removed: AtomicU64,
}

struct Inner<B> {
    backend: B,
    /// Winning descriptor per key
    latest: Mutex<HashMap<String, RecordDescriptor>>,
    /// Guards physical file access, one stripe per group of shards
    io_locks: Vec<tokio::sync::Mutex<()>>,
    write_attempts: u32,
    retry_delay: Duration,
    counters: Counters,
}

impl<B: StorageBackend> Inner<B> {
    /// I/O lock for the shard named `shard`
    fn shard_lock(&self, shard: &str) -> &tokio::sync::Mutex<()> {
        let stripe =
            u32::from_str_radix(shard, 16).map_or(0, |h| h as usize % self.io_locks.len());
        &self.io_locks[stripe]
    }

    fn io_lock(&self, unique_name: &str) -> &tokio::sync::Mutex<()> {
        self.shard_lock(&shard_hash(unique_name))
    }

    fn io_lock_for_path(&self, path: &Path) -> &tokio::sync::Mutex<()> {
        let shard = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        self.shard_lock(shard)
    }

    async fn list_all(&self) -> Result<Vec<RecordDescriptor>> {
        let root = Path::new(CACHE_DIRECTORY_NAME);
        let mut items = Vec::new();
        for shard in self.backend.list_folders(root).await? {
            if !is_shard_directory(&shard) {
                continue;
            }
            let files = self.backend.list_files(&root.join(&shard)).await?;
            items.extend(files.iter().filter_map(|f| decode_file_name(f)));
        }
        Ok(items)
    }

    /// All stored versions of `unique_name`, newest expiration first.
    ///
    /// Versions with equal expiration keep listing order.
    async fn versions(&self, unique_name: &str) -> Result<Vec<RecordDescriptor>> {
        let files = self.backend.list_files(&shard_directory(unique_name)).await?;
        let mut items: Vec<RecordDescriptor> = files
            .iter()
            .filter_map(|f| decode_file_name(f))
            .filter(|d| d.unique_name() == unique_name)
            .collect();
        items.sort_by(|a, b| b.expiration_time().cmp(&a.expiration_time()));
        Ok(items)
    }

    /// Write the file and publish `descriptor` as the key's winner under the
    /// same shard guard, so a concurrent lookup cannot publish an older one
    /// after it.
    async fn try_write(
        &self,
        descriptor: &RecordDescriptor,
        path: &Path,
        data: &[u8],
    ) -> Result<()> {
        ensure_path(&self.backend, path).await?;
        let _guard = self.io_lock_for_path(path).lock().await;
        self.backend.write_file(path, data).await?;
        self.latest
            .lock()
            .insert(descriptor.unique_name().to_string(), descriptor.clone());
        Ok(())
    }

    async fn write_with_retry(&self, descriptor: RecordDescriptor, data: Vec<u8>) {
        let file_name_len = encode_file_name(&descriptor).len();
        if file_name_len > MAX_FILE_NAME_BYTES {
            self.counters.writes_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                key = %descriptor.unique_name(),
                file_name_len,
                max = MAX_FILE_NAME_BYTES,
                "Dropping write, encoded file name too long"
            );
            return;
        }

        let path = record_path(&descriptor);

        for attempt in 1..=self.write_attempts {
            match self.try_write(&descriptor, &path, &data).await {
                Ok(()) => {
                    debug!(
                        key = %descriptor.unique_name(),
                        attempt,
                        size = data.len(),
                        "Committed record"
                    );
                    self.counters.writes_committed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    debug!(
                        key = %descriptor.unique_name(),
                        attempt,
                        error = %e,
                        "Write attempt failed"
                    );
                    if attempt < self.write_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        self.counters.writes_dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            key = %descriptor.unique_name(),
            attempts = self.write_attempts,
            file_name_len,
            "Dropping write after repeated failures"
        );
    }

    async fn delete_file(&self, path: &Path) {
        let _guard = self.io_lock_for_path(path).lock().await;
        if let Err(e) = self.backend.delete_file(path).await {
            debug!(path = ?path, error = %e, "Delete skipped");
        }
    }

    async fn purge(&self, unique_name: &str) {
        let versions = match self.versions(unique_name).await {
            Ok(versions) => versions,
            Err(e) => {
                debug!(key = %unique_name, error = %e, "Nothing to purge");
                return;
            }
        };
        for version in &versions {
            self.delete_file(&record_path(version)).await;
        }
        debug!(key = %unique_name, removed = versions.len(), "Purged key");
    }
}

/// [`StoreProvider`] over a sharded directory tree.
///
/// Mutations are executed by the queue `Q`; the provider keeps the winning
/// descriptor of every key it has resolved or written so repeated lookups
/// skip storage.
pub struct HashedStoreProvider<B, Q> {
    inner: Arc<Inner<B>>,
    queue: Q,
}

impl HashedStoreProvider<FsStorage, BackgroundQueue> {
    /// Open a store on the local file system with its own background queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let storage = FsStorage::new(config.root.clone());
        storage.init().await?;
        Self::new(storage, BackgroundQueue::with_capacity(config.queue_capacity), config)
    }
}

impl<B, Q> HashedStoreProvider<B, Q>
where
    B: StorageBackend + 'static,
    Q: WorkQueue,
{
    pub fn new(backend: B, queue: Q, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let io_locks = (0..config.io_lock_stripes)
            .map(|_| tokio::sync::Mutex::new(()))
            .collect();

        info!(
            write_attempts = config.write_attempts,
            retry_delay_ms = config.retry_delay.as_millis() as u64,
            io_lock_stripes = config.io_lock_stripes,
            "Hashed store provider created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                latest: Mutex::new(HashMap::new()),
                io_locks,
                write_attempts: config.write_attempts,
                retry_delay: config.retry_delay,
                counters: Counters::default(),
            }),
            queue,
        })
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// The in-memory winner for a key, without touching storage
    pub fn cached_latest(&self, unique_name: &str) -> Option<RecordDescriptor> {
        self.inner.latest.lock().get(unique_name).cloned()
    }

    pub fn stats(&self) -> ProviderStats {
        let counters = &self.inner.counters;
        ProviderStats {
            cached_entries: self.inner.latest.lock().len(),
            latest_hits: counters.latest_hits.load(Ordering::Relaxed),
            latest_misses: counters.latest_misses.load(Ordering::Relaxed),
            writes_committed: counters.writes_committed.load(Ordering::Relaxed),
            writes_dropped: counters.writes_dropped.load(Ordering::Relaxed),
            superseded_removed: counters.superseded_removed.load(Ordering::Relaxed),
        }
    }

    fn schedule<F>(&self, unique_name: &str, operation: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.queue.submit(Box::pin(task)) {
            warn!(key = %unique_name, operation, error = %e, "Could not schedule storage work");
        }
    }

    /// Pick the winner among the stored versions and schedule the rest for
    /// removal.
    ///
    /// The winner is published while the shard guard is still held; writes
    /// publish under the same guard.
    async fn resolve_latest(&self, unique_name: &str) -> Result<Option<RecordDescriptor>> {
        let _guard = self.inner.io_lock(unique_name).lock().await;
        let mut versions = self.inner.versions(unique_name).await?.into_iter();
        let Some(winner) = versions.next() else {
            return Ok(None);
        };

        for loser in versions {
            debug!(
                key = %unique_name,
                expiration = %loser.expiration_time(),
                "Removing superseded version"
            );
            self.inner
                .counters
                .superseded_removed
                .fetch_add(1, Ordering::Relaxed);
            self.delete(&loser);
        }

        self.inner
            .latest
            .lock()
            .insert(unique_name.to_string(), winner.clone());
        Ok(Some(winner))
    }
}

#[async_trait]
impl<B, Q> StoreProvider for HashedStoreProvider<B, Q>
where
    B: StorageBackend + 'static,
    Q: WorkQueue,
{
    fn is_buffered(&self) -> bool {
        false
    }

    async fn enumerate_all(&self) -> Vec<RecordDescriptor> {
        match self.inner.list_all().await {
            Ok(items) => items,
            Err(e) => {
                debug!(error = %e, "Store enumeration failed");
                Vec::new()
            }
        }
    }

    async fn enumerate(&self, unique_name: &str) -> Vec<RecordDescriptor> {
        if let Some(item) = self.cached_latest(unique_name) {
            self.inner.counters.latest_hits.fetch_add(1, Ordering::Relaxed);
            return vec![item];
        }
        self.inner.counters.latest_misses.fetch_add(1, Ordering::Relaxed);

        match self.resolve_latest(unique_name).await {
            Ok(winner) => winner.into_iter().collect(),
            Err(e) => {
                debug!(key = %unique_name, error = %e, "Lookup failed");
                Vec::new()
            }
        }
    }

    async fn read(&self, descriptor: &RecordDescriptor) -> Option<Vec<u8>> {
        let path = record_path(descriptor);
        let _guard = self.inner.io_lock(descriptor.unique_name()).lock().await;
        match self.inner.backend.read_file(&path).await {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(key = %descriptor.unique_name(), error = %e, "Read failed");
                None
            }
        }
    }

    fn write(&self, descriptor: RecordDescriptor, data: Vec<u8>) {
        let key = descriptor.unique_name().to_string();
        let inner = self.inner.clone();
        self.schedule(&key, "write", async move {
            inner.write_with_retry(descriptor, data).await;
        });
    }

    fn delete(&self, descriptor: &RecordDescriptor) {
        {
            let mut latest = self.inner.latest.lock();
            if latest.get(descriptor.unique_name()) == Some(descriptor) {
                latest.remove(descriptor.unique_name());
            }
        }

        let path = record_path(descriptor);
        let inner = self.inner.clone();
        self.schedule(descriptor.unique_name(), "delete", async move {
            inner.delete_file(&path).await;
        });
    }

    fn delete_all(&self, unique_name: &str) {
        self.inner.latest.lock().remove(unique_name);

        let key = unique_name.to_string();
        let inner = self.inner.clone();
        self.schedule(unique_name, "delete_all", async move {
            inner.purge(&key).await;
        });
    }

    fn flush(&self, _synchronous: bool) {}
}
