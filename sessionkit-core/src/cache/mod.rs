//! Bounded in-memory caches.
//!
//! Two independent caps bound the window during which decrypted secrets sit
//! in process memory: a per-entry TTL and an LRU capacity limit on the
//! credential cache. The storage-handle cache is LRU-bounded only — handles
//! are not secrets and carry no time expiry.

pub mod credentials;
pub mod handles;

pub use credentials::{CachedCredentials, CredentialCache, CredentialUpdate};
pub use handles::{ScopedStorage, StorageHandle, StorageHandleCache};
