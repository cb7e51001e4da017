//! LRU-bounded cache of per-wallet storage handles and the scoped storage
//! facade built on top of it.
//!
//! A storage handle is the opaque, deterministically derived namespace key
//! under which a wallet's non-sensitive data lives in the durable key-value
//! store. Handles are not secrets: the cache is LRU-bounded (capacity 10)
//! but carries no time expiry. A cache miss triggers asynchronous
//! derivation; calls arriving while a derivation is in flight queue in
//! arrival order behind it and replay once the handle resolves.
//!
//! Failures below this layer degrade rather than propagate: the data held
//! here is non-sensitive and reconstructable, so writes never throw to the
//! caller (logged only) and reads return an empty result that callers treat
//! as transient.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::platform::KeyValueStore;
use crate::types::WalletId;

/// Maximum number of cached handles.
pub const HANDLE_CACHE_CAPACITY: usize = 10;

/// Static salt mixed into handle derivation.
const HANDLE_SALT: &[u8] = b"sessionkit:storage-handle:salt";

/// Opaque handle naming one wallet's storage namespace.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageHandle(String);

impl StorageHandle {
    /// Returns the namespaced key for `key` under this handle.
    #[must_use]
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}:{key}", self.0)
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageHandle({})", self.0)
    }
}

struct HandleEntry {
    handle: StorageHandle,
    access_counter: u64,
}

struct CacheInner {
    entries: HashMap<WalletId, HandleEntry>,
    access_counter: u64,
}

/// LRU-bounded map of wallet identifier to storage handle.
///
/// The inner lock is an async mutex held across derivation, so concurrent
/// requests for a missing handle queue in arrival order and observe the
/// derived handle once it resolves.
pub struct StorageHandleCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl StorageHandleCache {
    /// Creates a cache with the default capacity (10).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HANDLE_CACHE_CAPACITY)
    }

    /// Creates a cache with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                access_counter: 0,
            }),
        }
    }

    /// Returns the handle for `id`, deriving it on a miss.
    ///
    /// Derivation is deterministic (static salt + identifier, hashed), so a
    /// re-derived handle after LRU eviction names the same namespace.
    pub async fn handle(&self, id: &WalletId) -> StorageHandle {
        let mut inner = self.inner.lock().await;
        inner.access_counter += 1;
        let access = inner.access_counter;

        if let Some(entry) = inner.entries.get_mut(id) {
            entry.access_counter = access;
            return entry.handle.clone();
        }

        let handle = derive_handle(id);
        if inner.entries.len() >= self.capacity {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_counter)
                .map(|(victim, _)| victim.clone())
            {
                inner.entries.remove(&victim);
                log::debug!("storage handle cache evicted LRU entry: {victim}");
            }
        }
        inner.entries.insert(
            id.clone(),
            HandleEntry {
                handle: handle.clone(),
                access_counter: access,
            },
        );
        handle
    }

    /// Drops the cached handle for `id`, if any. The handle can always be
    /// re-derived.
    pub async fn forget(&self, id: &WalletId) {
        self.inner.lock().await.entries.remove(id);
    }

    /// Number of cached handles.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

impl Default for StorageHandleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the storage handle for an identifier.
fn derive_handle(id: &WalletId) -> StorageHandle {
    let mut hasher = Sha256::new();
    hasher.update(HANDLE_SALT);
    hasher.update(id.as_str().as_bytes());
    StorageHandle(hex::encode(hasher.finalize()))
}

/// Per-wallet view over the durable key-value store, namespaced by derived
/// storage handle.
///
/// All failures degrade: dropped writes and empty reads, logged only.
pub struct ScopedStorage {
    handles: StorageHandleCache,
    kv: Arc<dyn KeyValueStore>,
}

impl ScopedStorage {
    /// Creates a scoped storage facade over `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            handles: StorageHandleCache::new(),
            kv,
        }
    }

    /// Writes `value` under the wallet's namespace. Never returns an error;
    /// failures are logged and the write is dropped.
    pub async fn write(&self, id: &WalletId, key: &str, value: &str) {
        let handle = self.handles.handle(id).await;
        if let Err(err) = self.kv.set_item(&handle.scoped_key(key), value).await {
            log::warn!("dropped scoped write for {id}/{key}: {err}");
        }
    }

    /// Reads `key` from the wallet's namespace. Failures return `None`;
    /// callers treat an empty read as transient, not permanent.
    pub async fn read(&self, id: &WalletId, key: &str) -> Option<String> {
        let handle = self.handles.handle(id).await;
        match self.kv.get_item(&handle.scoped_key(key)).await {
            Ok(value) => value,
            Err(err) => {
                log::warn!("scoped read failed for {id}/{key}: {err}");
                None
            }
        }
    }

    /// Removes `key` from the wallet's namespace, with the same degraded
    /// failure policy as writes.
    pub async fn remove(&self, id: &WalletId, key: &str) {
        let handle = self.handles.handle(id).await;
        if let Err(err) = self.kv.remove_item(&handle.scoped_key(key)).await {
            log::warn!("dropped scoped remove for {id}/{key}: {err}");
        }
    }

    /// Drops the cached handle for a deleted wallet.
    pub async fn forget(&self, id: &WalletId) {
        self.handles.forget(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::platform::memory::MemoryKvStore;

    fn id(s: &str) -> WalletId {
        WalletId::new(s)
    }

    #[tokio::test]
    async fn test_derivation_is_deterministic() {
        let cache = StorageHandleCache::new();
        let first = cache.handle(&id("alice")).await;
        cache.forget(&id("alice")).await;
        let second = cache.handle(&id("alice")).await;
        assert_eq!(first, second);

        let other = cache.handle(&id("bob")).await;
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_accessed() {
        let cache = StorageHandleCache::with_capacity(2);
        let handle_a = cache.handle(&id("a")).await;
        cache.handle(&id("b")).await;
        // Touch "a" so "b" is the LRU victim.
        cache.handle(&id("a")).await;
        cache.handle(&id("c")).await;
        assert_eq!(cache.len().await, 2);

        // Re-deriving an evicted handle yields the same namespace.
        let handle_a_again = cache.handle(&id("a")).await;
        assert_eq!(handle_a, handle_a_again);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_observe_one_handle() {
        let cache = Arc::new(StorageHandleCache::new());
        let cache_a = Arc::clone(&cache);
        let cache_b = Arc::clone(&cache);
        let wallet = id("alice");
        let wallet_a = wallet.clone();
        let wallet_b = wallet.clone();

        let (first, second) = tokio::join!(
            async move { cache_a.handle(&wallet_a).await },
            async move { cache_b.handle(&wallet_b).await },
        );
        assert_eq!(first, second);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_scoped_storage_round_trip() {
        let kv = Arc::new(MemoryKvStore::new());
        let storage = ScopedStorage::new(kv.clone());

        storage.write(&id("alice"), "addresses", "{}").await;
        assert_eq!(
            storage.read(&id("alice"), "addresses").await.as_deref(),
            Some("{}")
        );
        // Namespaces do not collide.
        assert!(storage.read(&id("bob"), "addresses").await.is_none());

        storage.remove(&id("alice"), "addresses").await;
        assert!(storage.read(&id("alice"), "addresses").await.is_none());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_dropped_write_and_empty_read() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.fail_with(SessionError::Storage("disk full".to_string()));
        let storage = ScopedStorage::new(kv.clone());

        // Neither call returns an error to the caller.
        storage.write(&id("alice"), "balances", "{}").await;
        assert!(storage.read(&id("alice"), "balances").await.is_none());

        kv.clear_failure();
        storage.write(&id("alice"), "balances", "{}").await;
        assert_eq!(
            storage.read(&id("alice"), "balances").await.as_deref(),
            Some("{}")
        );
    }
}
