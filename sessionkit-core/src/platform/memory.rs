//! In-memory implementations of the platform traits for testing.
//!
//! These implementations are NOT secure for production use. The worklet
//! "encrypts" with a repeating-XOR keystream and the vault holds material in
//! a plain map; they exist to test the coordination layer's interaction with
//! its collaborators, including call counting and failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use zeroize::Zeroizing;

use crate::error::{SessionError, SessionResult};
use crate::types::{
    EncryptedMaterial, MnemonicWordCount, StoredMaterial, WalletId, WorkletConfig,
};

use super::{KeyValueStore, VaultService, WorkletService};

/// Word pool for generated test phrases.
const TEST_WORDS: &[&str] = &[
    "abandon", "ability", "able", "about", "above", "absent", "absorb",
    "abstract", "absurd", "abuse", "access", "accident", "account", "accuse",
    "achieve", "acid",
];

fn xor_keystream(key: &[u8], data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, key_byte)| byte ^ key_byte)
        .collect()
}

// =============================================================================
// Memory Worklet
// =============================================================================

#[derive(Default)]
struct WorkletCalls {
    start: AtomicUsize,
    initialize_session: AtomicUsize,
    generate_entropy: AtomicUsize,
    seed_from_mnemonic: AtomicUsize,
    mnemonic_from_entropy: AtomicUsize,
}

/// In-memory worklet with call counters and a configurable session-init
/// delay for race tests.
///
/// **FOR TESTING ONLY** — entropy is the UTF-8 bytes of the phrase and
/// "encryption" is a repeating-XOR keystream, so `mnemonic_from_entropy`
/// round-trips exactly.
#[derive(Default)]
pub struct MemoryWorklet {
    started: Mutex<bool>,
    session_key: Mutex<Option<Zeroizing<Vec<u8>>>>,
    init_delay: Mutex<Duration>,
    fail_next_init: Mutex<Option<String>>,
    calls: WorkletCalls,
}

impl MemoryWorklet {
    /// Creates a stopped worklet with no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a delay applied inside every subsequent `initialize_session`.
    pub fn set_init_delay(&self, delay: Duration) {
        *self.lock(&self.init_delay) = delay;
    }

    /// Makes the next `initialize_session` call fail with the given message.
    pub fn fail_next_init(&self, message: impl Into<String>) {
        *self.lock(&self.fail_next_init) = Some(message.into());
    }

    /// Whether the worklet has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.lock(&self.started)
    }

    /// Whether a session is currently initialized.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.lock(&self.session_key).is_some()
    }

    /// The encryption key of the current session, if any.
    #[must_use]
    pub fn session_key(&self) -> Option<Vec<u8>> {
        self.lock(&self.session_key)
            .as_ref()
            .map(|key| key.to_vec())
    }

    /// Number of `start` calls.
    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.calls.start.load(Ordering::SeqCst)
    }

    /// Number of `initialize_session` calls.
    #[must_use]
    pub fn initialize_session_calls(&self) -> usize {
        self.calls.initialize_session.load(Ordering::SeqCst)
    }

    /// Total calls across every worklet operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.start.load(Ordering::SeqCst)
            + self.calls.initialize_session.load(Ordering::SeqCst)
            + self.calls.generate_entropy.load(Ordering::SeqCst)
            + self.calls.seed_from_mnemonic.load(Ordering::SeqCst)
            + self.calls.mnemonic_from_entropy.load(Ordering::SeqCst)
    }

    /// Clears state and counters (test isolation).
    pub fn reset(&self) {
        *self.lock(&self.started) = false;
        *self.lock(&self.session_key) = None;
        *self.lock(&self.init_delay) = Duration::ZERO;
        *self.lock(&self.fail_next_init) = None;
        self.calls.start.store(0, Ordering::SeqCst);
        self.calls.initialize_session.store(0, Ordering::SeqCst);
        self.calls.generate_entropy.store(0, Ordering::SeqCst);
        self.calls.seed_from_mnemonic.store(0, Ordering::SeqCst);
        self.calls.mnemonic_from_entropy.store(0, Ordering::SeqCst);
    }

    fn material_from_entropy(entropy: &[u8]) -> EncryptedMaterial {
        let mut encryption_key = vec![0u8; 32];
        OsRng.fill_bytes(&mut encryption_key);
        let seed: Vec<u8> = {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(entropy);
            hasher.finalize().to_vec()
        };
        EncryptedMaterial {
            encrypted_seed: xor_keystream(&encryption_key, &seed),
            encrypted_entropy: xor_keystream(&encryption_key, entropy),
            encryption_key,
        }
    }

    #[allow(clippy::unused_self)]
    fn lock<'a, T>(&'a self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl WorkletService for MemoryWorklet {
    async fn start(&self, _config: WorkletConfig) -> SessionResult<()> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        // Idempotent: a second start is a no-op.
        *self.lock(&self.started) = true;
        Ok(())
    }

    async fn initialize_session(
        &self,
        encryption_key: &[u8],
        _encrypted_seed: &[u8],
    ) -> SessionResult<()> {
        self.calls.initialize_session.fetch_add(1, Ordering::SeqCst);
        if !self.is_started() {
            return Err(SessionError::Worklet("worklet not started".to_string()));
        }
        let delay = *self.lock(&self.init_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.lock(&self.fail_next_init).take() {
            return Err(SessionError::Worklet(message));
        }
        *self.lock(&self.session_key) =
            Some(Zeroizing::new(encryption_key.to_vec()));
        Ok(())
    }

    async fn generate_entropy_and_encrypt(
        &self,
        word_count: MnemonicWordCount,
    ) -> SessionResult<EncryptedMaterial> {
        self.calls.generate_entropy.fetch_add(1, Ordering::SeqCst);
        if !self.is_started() {
            return Err(SessionError::Worklet("worklet not started".to_string()));
        }
        let phrase: Vec<&str> = (0..word_count.words())
            .map(|_| TEST_WORDS[OsRng.gen_range(0..TEST_WORDS.len())])
            .collect();
        Ok(Self::material_from_entropy(phrase.join(" ").as_bytes()))
    }

    async fn seed_from_mnemonic(&self, phrase: &str) -> SessionResult<EncryptedMaterial> {
        self.calls.seed_from_mnemonic.fetch_add(1, Ordering::SeqCst);
        if !self.is_started() {
            return Err(SessionError::Worklet("worklet not started".to_string()));
        }
        if phrase.trim().is_empty() {
            return Err(SessionError::Worklet("empty recovery phrase".to_string()));
        }
        Ok(Self::material_from_entropy(phrase.as_bytes()))
    }

    async fn mnemonic_from_entropy(
        &self,
        encrypted_entropy: &[u8],
        encryption_key: &[u8],
    ) -> SessionResult<String> {
        self.calls
            .mnemonic_from_entropy
            .fetch_add(1, Ordering::SeqCst);
        let entropy = xor_keystream(encryption_key, encrypted_entropy);
        String::from_utf8(entropy)
            .map_err(|_| SessionError::Worklet("entropy is not a phrase".to_string()))
    }
}

// =============================================================================
// Memory Vault
// =============================================================================

struct VaultRecord {
    encryption_key: Vec<u8>,
    encrypted_seed: Vec<u8>,
    encrypted_entropy: Option<Vec<u8>>,
}

#[derive(Default)]
struct VaultCalls {
    authenticate: AtomicUsize,
    exists: AtomicUsize,
    write_all: AtomicUsize,
    read_all: AtomicUsize,
    delete: AtomicUsize,
}

/// In-memory vault with an authentication toggle and call counters.
///
/// **FOR TESTING ONLY** — records are held decrypted in a plain map.
pub struct MemoryVault {
    records: Mutex<HashMap<WalletId, VaultRecord>>,
    authenticate_allowed: Mutex<bool>,
    fail_next_delete: Mutex<Option<String>>,
    calls: VaultCalls,
}

impl MemoryVault {
    /// Creates an empty vault that approves authentication.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            authenticate_allowed: Mutex::new(true),
            fail_next_delete: Mutex::new(None),
            calls: VaultCalls::default(),
        }
    }

    /// Makes the next `delete` call fail with the given message.
    pub fn fail_next_delete(&self, message: impl Into<String>) {
        *self.lock(&self.fail_next_delete) = Some(message.into());
    }

    /// Controls whether `authenticate` approves (simulates the user
    /// accepting or dismissing the biometric prompt).
    pub fn set_authenticate_allowed(&self, allowed: bool) {
        *self.lock(&self.authenticate_allowed) = allowed;
    }

    /// Drops the entropy from a stored record, simulating an older vault
    /// record written before entropy was persisted.
    pub fn strip_entropy(&self, id: &WalletId) {
        if let Some(record) = self.lock(&self.records).get_mut(id) {
            record.encrypted_entropy = None;
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.lock(&self.records).len()
    }

    /// Number of `read_all` calls.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.calls.read_all.load(Ordering::SeqCst)
    }

    /// Number of `authenticate` calls.
    #[must_use]
    pub fn authenticate_calls(&self) -> usize {
        self.calls.authenticate.load(Ordering::SeqCst)
    }

    /// Total calls across every vault operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.authenticate.load(Ordering::SeqCst)
            + self.calls.exists.load(Ordering::SeqCst)
            + self.calls.write_all.load(Ordering::SeqCst)
            + self.calls.read_all.load(Ordering::SeqCst)
            + self.calls.delete.load(Ordering::SeqCst)
    }

    /// Clears records, toggle, and counters (test isolation).
    pub fn reset(&self) {
        self.lock(&self.records).clear();
        *self.lock(&self.authenticate_allowed) = true;
        *self.lock(&self.fail_next_delete) = None;
        self.calls.authenticate.store(0, Ordering::SeqCst);
        self.calls.exists.store(0, Ordering::SeqCst);
        self.calls.write_all.store(0, Ordering::SeqCst);
        self.calls.read_all.store(0, Ordering::SeqCst);
        self.calls.delete.store(0, Ordering::SeqCst);
    }

    #[allow(clippy::unused_self)]
    fn lock<'a, T>(&'a self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultService for MemoryVault {
    async fn authenticate(&self) -> SessionResult<bool> {
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);
        Ok(*self.lock(&self.authenticate_allowed))
    }

    async fn exists(&self, id: &WalletId) -> SessionResult<bool> {
        self.calls.exists.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock(&self.records).contains_key(id))
    }

    async fn write_all(
        &self,
        id: &WalletId,
        material: &EncryptedMaterial,
    ) -> SessionResult<()> {
        self.calls.write_all.fetch_add(1, Ordering::SeqCst);
        self.lock(&self.records).insert(
            id.clone(),
            VaultRecord {
                encryption_key: material.encryption_key.clone(),
                encrypted_seed: material.encrypted_seed.clone(),
                encrypted_entropy: Some(material.encrypted_entropy.clone()),
            },
        );
        Ok(())
    }

    async fn read_all(&self, id: &WalletId) -> SessionResult<StoredMaterial> {
        self.calls.read_all.fetch_add(1, Ordering::SeqCst);
        let records = self.lock(&self.records);
        let record = records
            .get(id)
            .ok_or_else(|| SessionError::WalletNotFound(id.clone()))?;
        Ok(StoredMaterial {
            encryption_key: Some(Zeroizing::new(record.encryption_key.clone())),
            encrypted_seed: Some(record.encrypted_seed.clone()),
            encrypted_entropy: record.encrypted_entropy.clone(),
        })
    }

    async fn delete(&self, id: &WalletId) -> SessionResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.lock(&self.fail_next_delete).take() {
            return Err(SessionError::Vault(message));
        }
        self.lock(&self.records).remove(id);
        Ok(())
    }
}

// =============================================================================
// Memory Key-Value Store
// =============================================================================

/// In-memory key-value store with failure injection.
#[derive(Default)]
pub struct MemoryKvStore {
    items: Mutex<HashMap<String, String>>,
    failure: Mutex<Option<String>>,
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with the given error.
    pub fn fail_with(&self, err: SessionError) {
        *self.lock(&self.failure) = Some(err.to_string());
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self) {
        *self.lock(&self.failure) = None;
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock(&self.items).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock(&self.items).is_empty()
    }

    /// Clears items and any injected failure (test isolation).
    pub fn reset(&self) {
        self.lock(&self.items).clear();
        *self.lock(&self.failure) = None;
    }

    fn check_failure(&self) -> SessionResult<()> {
        match self.lock(&self.failure).as_ref() {
            Some(message) => Err(SessionError::Storage(message.clone())),
            None => Ok(()),
        }
    }

    #[allow(clippy::unused_self)]
    fn lock<'a, T>(&'a self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>> {
        self.check_failure()?;
        Ok(self.lock(&self.items).get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.lock(&self.items)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.lock(&self.items).remove(key);
        Ok(())
    }
}

// =============================================================================
// Memory Platform Bundle
// =============================================================================

/// Combines all in-memory implementations for easy test setup.
pub struct MemoryPlatform {
    /// In-memory worklet.
    pub worklet: Arc<MemoryWorklet>,
    /// In-memory vault.
    pub vault: Arc<MemoryVault>,
    /// In-memory key-value store.
    pub kv: Arc<MemoryKvStore>,
}

impl MemoryPlatform {
    /// Creates a new memory platform with default components.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worklet: Arc::new(MemoryWorklet::new()),
            vault: Arc::new(MemoryVault::new()),
            kv: Arc::new(MemoryKvStore::new()),
        }
    }

    /// Clears all stored data (test isolation).
    pub fn reset(&self) {
        self.worklet.reset();
        self.vault.reset();
        self.kv.reset();
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worklet_requires_start() {
        let worklet = MemoryWorklet::new();
        let err = worklet
            .generate_entropy_and_encrypt(MnemonicWordCount::Twelve)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Worklet(_)));

        worklet.start(WorkletConfig::default()).await.unwrap();
        worklet.start(WorkletConfig::default()).await.unwrap();
        assert!(worklet.is_started());
        assert_eq!(worklet.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_worklet_phrase_round_trip() {
        let worklet = MemoryWorklet::new();
        worklet.start(WorkletConfig::default()).await.unwrap();

        let material = worklet
            .seed_from_mnemonic("abandon ability able")
            .await
            .unwrap();
        let phrase = worklet
            .mnemonic_from_entropy(
                &material.encrypted_entropy,
                &material.encryption_key,
            )
            .await
            .unwrap();
        assert_eq!(phrase, "abandon ability able");
    }

    #[tokio::test]
    async fn test_worklet_generates_requested_word_count() {
        let worklet = MemoryWorklet::new();
        worklet.start(WorkletConfig::default()).await.unwrap();

        let material = worklet
            .generate_entropy_and_encrypt(MnemonicWordCount::TwentyFour)
            .await
            .unwrap();
        let phrase = worklet
            .mnemonic_from_entropy(
                &material.encrypted_entropy,
                &material.encryption_key,
            )
            .await
            .unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
    }

    #[tokio::test]
    async fn test_vault_round_trip_and_counters() {
        let vault = MemoryVault::new();
        let id = WalletId::new("alice");
        assert!(!vault.exists(&id).await.unwrap());

        let material = EncryptedMaterial {
            encryption_key: vec![1; 32],
            encrypted_seed: vec![2; 32],
            encrypted_entropy: vec![3; 16],
        };
        vault.write_all(&id, &material).await.unwrap();
        assert!(vault.exists(&id).await.unwrap());

        let stored = vault.read_all(&id).await.unwrap();
        assert_eq!(stored.encryption_key.as_ref().unwrap().as_slice(), &[1; 32]);
        assert_eq!(stored.encrypted_entropy.as_deref(), Some([3; 16].as_slice()));

        vault.delete(&id).await.unwrap();
        assert!(!vault.exists(&id).await.unwrap());
        assert_eq!(vault.total_calls(), 6);
    }

    #[tokio::test]
    async fn test_vault_authentication_toggle() {
        let vault = MemoryVault::new();
        assert!(vault.authenticate().await.unwrap());
        vault.set_authenticate_allowed(false);
        assert!(!vault.authenticate().await.unwrap());
        assert_eq!(vault.authenticate_calls(), 2);
    }

    #[tokio::test]
    async fn test_kv_store_failure_injection() {
        let store = MemoryKvStore::new();
        store.set_item("key", "value").await.unwrap();

        store.fail_with(SessionError::Storage("boom".to_string()));
        assert!(store.get_item("key").await.is_err());
        assert!(store.set_item("key", "other").await.is_err());

        store.clear_failure();
        assert_eq!(store.get_item("key").await.unwrap().as_deref(), Some("value"));
    }
}
