//! TTL + LRU-bounded cache of partially-decrypted session material.
//!
//! Keeping credentials cached avoids re-prompting biometrics on every
//! operation; the TTL and the capacity bound are two independent caps on how
//! long decrypted secrets sit in memory. Entries expire lazily on read,
//! never in the background.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::types::WalletId;

/// How long a cached entry stays valid after its most recent write.
pub const CREDENTIAL_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of wallets with cached credentials.
pub const CREDENTIAL_CACHE_CAPACITY: usize = 15;

/// Partially-decrypted session material for one wallet.
///
/// Every field is optional; writes merge fields so material gathered by
/// different operations accumulates into one entry.
#[derive(Default, Clone)]
pub struct CachedCredentials {
    /// Decrypted encryption key for the worklet session.
    pub encryption_key: Option<Zeroizing<Vec<u8>>>,
    /// Encrypted seed bytes.
    pub encrypted_seed: Option<Vec<u8>>,
    /// Encrypted entropy bytes.
    pub encrypted_entropy: Option<Vec<u8>>,
}

/// Fields to merge into a wallet's cache entry.
pub type CredentialUpdate = CachedCredentials;

struct CacheEntry {
    credentials: CachedCredentials,
    expires_at: Instant,
    last_touched: u64,
}

struct CacheInner {
    entries: HashMap<WalletId, CacheEntry>,
    touch_counter: u64,
}

/// TTL + LRU-bounded credential cache.
pub struct CredentialCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl CredentialCache {
    /// Creates a cache with the default TTL (5 minutes) and capacity (15).
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(CREDENTIAL_TTL, CREDENTIAL_CACHE_CAPACITY)
    }

    /// Creates a cache with explicit limits.
    #[must_use]
    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                touch_counter: 0,
            }),
        }
    }

    /// Returns the entry for `id` if its TTL has not elapsed; an expired
    /// entry is evicted and `None` returned (lazy expiry). A hit refreshes
    /// the entry's LRU recency but not its TTL.
    #[must_use]
    pub fn get(&self, id: &WalletId) -> Option<CachedCredentials> {
        let mut inner = self.lock();
        let now = Instant::now();
        let expired = match inner.entries.get(id) {
            Some(entry) => now >= entry.expires_at,
            None => return None,
        };
        if expired {
            inner.entries.remove(id);
            log::debug!("credential cache entry expired: {id}");
            return None;
        }
        inner.touch_counter += 1;
        let touch = inner.touch_counter;
        inner.entries.get_mut(id).map(|entry| {
            entry.last_touched = touch;
            entry.credentials.clone()
        })
    }

    /// Merges `update` into the entry for `id`, always resetting the TTL.
    ///
    /// Inserting beyond capacity evicts the least-recently-touched entry
    /// regardless of its remaining TTL.
    pub fn set(&self, id: &WalletId, update: CredentialUpdate) {
        let mut inner = self.lock();
        let expires_at = Instant::now() + self.ttl;
        inner.touch_counter += 1;
        let touch = inner.touch_counter;

        if let Some(entry) = inner.entries.get_mut(id) {
            merge(&mut entry.credentials, update);
            entry.expires_at = expires_at;
            entry.last_touched = touch;
            return;
        }

        if inner.entries.len() >= self.capacity {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_touched)
                .map(|(victim, _)| victim.clone())
            {
                inner.entries.remove(&victim);
                log::debug!("credential cache evicted LRU entry: {victim}");
            }
        }

        inner.entries.insert(
            id.clone(),
            CacheEntry {
                credentials: update,
                expires_at,
                last_touched: touch,
            },
        );
    }

    /// Removes the entry for one wallet.
    pub fn clear_wallet(&self, id: &WalletId) {
        self.lock().entries.remove(id);
    }

    /// Removes every entry ("clear all sensitive data").
    pub fn clear_all(&self) {
        self.lock().entries.clear();
    }

    /// Number of live entries, including any whose TTL has elapsed but that
    /// have not yet been read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(target: &mut CachedCredentials, update: CredentialUpdate) {
    if update.encryption_key.is_some() {
        target.encryption_key = update.encryption_key;
    }
    if update.encrypted_seed.is_some() {
        target.encrypted_seed = update.encrypted_seed;
    }
    if update.encrypted_entropy.is_some() {
        target.encrypted_entropy = update.encrypted_entropy;
    }
}
