//! Per-wallet address/balance maps, the wallet roster, and the active
//! identifier pointer, with best-effort persistence.
//!
//! Addresses are write-once and deterministic — once derived they are never
//! refetched. Balances are mutable and non-authoritative: the persisted copy
//! is a display cache, so persistence failures degrade with a log instead of
//! propagating. Loading state, mutex state, and cached credentials are never
//! persisted here or anywhere else.
//!
//! A wallet's namespace is created on its first successful write and deleted
//! in full — across every map — when the wallet is deleted. Writes for an
//! identifier that is not in the roster are discarded with a log, so results
//! that outlive a timed-out operation cannot resurrect stale state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::cache::ScopedStorage;
use crate::platform::KeyValueStore;
use crate::types::{WalletId, WalletInfo};

const ROSTER_KEY: &str = "sessionkit.roster";
const ACTIVE_KEY: &str = "sessionkit.active";
const ADDRESSES_KEY: &str = "addresses";
const BALANCES_KEY: &str = "balances";

/// `network -> account index -> address`.
pub type AddressMap = HashMap<String, HashMap<u32, String>>;

/// `network -> account index -> asset id -> balance string`.
pub type BalanceMap = HashMap<String, HashMap<u32, HashMap<String, String>>>;

#[derive(Serialize, Deserialize)]
struct PersistedRosterEntry {
    id: WalletId,
    exists: bool,
}

#[derive(Default)]
struct StoreInner {
    addresses: HashMap<WalletId, AddressMap>,
    balances: HashMap<WalletId, BalanceMap>,
    balances_loading: HashMap<WalletId, bool>,
    /// Roster: identifier -> exists flag. Ordered for deterministic
    /// persistence and listing.
    wallets: BTreeMap<WalletId, bool>,
    active: Option<WalletId>,
}

/// Wallet data store: addresses, balances, roster, active pointer.
///
/// Read accessors are synchronous snapshots and are never gated by the
/// operation mutex; mutators are async because they persist best-effort.
pub struct WalletDataStore {
    inner: Mutex<StoreInner>,
    scoped: ScopedStorage,
    kv: Arc<dyn KeyValueStore>,
}

impl WalletDataStore {
    /// Creates an empty store over the given key-value store.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            scoped: ScopedStorage::new(Arc::clone(&kv)),
            kv,
        }
    }

    /// Hydrates roster, active pointer, and per-wallet maps from the
    /// key-value store. Missing or unreadable data starts empty; hydration
    /// never fails.
    pub async fn load(&self) {
        let roster = self.read_roster().await;
        let active = match self.kv.get_item(ACTIVE_KEY).await {
            Ok(value) => value.map(WalletId::new),
            Err(err) => {
                log::warn!("failed to read active wallet pointer: {err}");
                None
            }
        };

        let ids: Vec<WalletId> = roster.iter().map(|entry| entry.id.clone()).collect();
        let mut addresses = HashMap::new();
        let mut balances = HashMap::new();
        for id in &ids {
            if let Some(map) = self.read_scoped_json::<AddressMap>(id, ADDRESSES_KEY).await
            {
                addresses.insert(id.clone(), map);
            }
            if let Some(map) = self.read_scoped_json::<BalanceMap>(id, BALANCES_KEY).await
            {
                balances.insert(id.clone(), map);
            }
        }

        let mut inner = self.lock();
        inner.wallets = roster
            .into_iter()
            .map(|entry| (entry.id, entry.exists))
            .collect();
        // A stale pointer to a wallet no longer in the roster is dropped.
        inner.active = active.filter(|id| inner.wallets.contains_key(id));
        inner.addresses = addresses;
        inner.balances = balances;
        inner.balances_loading.clear();
    }

    // ── Roster & active pointer ─────────────────────────────────────────

    /// Adds a wallet to the roster (exists = true) and persists it.
    pub async fn register_wallet(&self, id: &WalletId) {
        {
            let mut inner = self.lock();
            inner.wallets.insert(id.clone(), true);
        }
        self.persist_roster().await;
    }

    /// Current roster with active flags resolved.
    #[must_use]
    pub fn roster(&self) -> Vec<WalletInfo> {
        let inner = self.lock();
        inner
            .wallets
            .iter()
            .map(|(id, exists)| WalletInfo {
                id: id.clone(),
                exists: *exists,
                is_active: inner.active.as_ref() == Some(id),
            })
            .collect()
    }

    /// Whether the roster contains the identifier.
    #[must_use]
    pub fn contains(&self, id: &WalletId) -> bool {
        self.lock().wallets.contains_key(id)
    }

    /// The active wallet identifier, if any.
    #[must_use]
    pub fn active_wallet(&self) -> Option<WalletId> {
        self.lock().active.clone()
    }

    /// Sets the active pointer and persists it.
    pub async fn set_active(&self, id: &WalletId) {
        {
            let mut inner = self.lock();
            inner.active = Some(id.clone());
        }
        if let Err(err) = self.kv.set_item(ACTIVE_KEY, id.as_str()).await {
            log::warn!("failed to persist active wallet pointer: {err}");
        }
    }

    /// Clears the active pointer and removes the persisted copy.
    pub async fn clear_active(&self) {
        {
            let mut inner = self.lock();
            inner.active = None;
        }
        if let Err(err) = self.kv.remove_item(ACTIVE_KEY).await {
            log::warn!("failed to remove active wallet pointer: {err}");
        }
    }

    // ── Addresses ───────────────────────────────────────────────────────

    /// Records a derived address. Addresses are write-once: a second write
    /// for the same `(network, account)` slot is ignored. Writes for wallets
    /// not in the roster are discarded.
    pub async fn set_address(
        &self,
        id: &WalletId,
        network: &str,
        account: u32,
        address: String,
    ) {
        {
            let mut inner = self.lock();
            if !inner.wallets.contains_key(id) {
                log::warn!("discarding address write for unknown wallet: {id}");
                return;
            }
            let slot = inner
                .addresses
                .entry(id.clone())
                .or_default()
                .entry(network.to_string())
                .or_default();
            if slot.contains_key(&account) {
                log::debug!(
                    "ignoring repeat address write: {id}/{network}/{account}"
                );
                return;
            }
            slot.insert(account, address);
        }
        self.persist_scoped_json(id, ADDRESSES_KEY, &self.addresses_for(id))
            .await;
    }

    /// The recorded address for a slot, if derived.
    #[must_use]
    pub fn address(&self, id: &WalletId, network: &str, account: u32) -> Option<String> {
        self.lock()
            .addresses
            .get(id)
            .and_then(|map| map.get(network))
            .and_then(|accounts| accounts.get(&account))
            .cloned()
    }

    /// Snapshot of a wallet's full address map.
    #[must_use]
    pub fn addresses_for(&self, id: &WalletId) -> AddressMap {
        self.lock().addresses.get(id).cloned().unwrap_or_default()
    }

    // ── Balances ────────────────────────────────────────────────────────

    /// Records a refreshed balance. Balances are mutable. Writes for wallets
    /// not in the roster are discarded (late-result protection).
    pub async fn set_balance(
        &self,
        id: &WalletId,
        network: &str,
        account: u32,
        asset: &str,
        balance: String,
    ) {
        {
            let mut inner = self.lock();
            if !inner.wallets.contains_key(id) {
                log::warn!("discarding balance write for unknown wallet: {id}");
                return;
            }
            inner
                .balances
                .entry(id.clone())
                .or_default()
                .entry(network.to_string())
                .or_default()
                .entry(account)
                .or_default()
                .insert(asset.to_string(), balance);
        }
        self.persist_scoped_json(id, BALANCES_KEY, &self.balances_for(id))
            .await;
    }

    /// The recorded balance for a slot, if any.
    #[must_use]
    pub fn balance(
        &self,
        id: &WalletId,
        network: &str,
        account: u32,
        asset: &str,
    ) -> Option<String> {
        self.lock()
            .balances
            .get(id)
            .and_then(|map| map.get(network))
            .and_then(|accounts| accounts.get(&account))
            .and_then(|assets| assets.get(asset))
            .cloned()
    }

    /// Snapshot of a wallet's full balance map.
    #[must_use]
    pub fn balances_for(&self, id: &WalletId) -> BalanceMap {
        self.lock().balances.get(id).cloned().unwrap_or_default()
    }

    /// Flags a balance refresh as in flight for the wallet.
    pub fn set_balances_loading(&self, id: &WalletId, loading: bool) {
        self.lock().balances_loading.insert(id.clone(), loading);
    }

    /// Whether a balance refresh is in flight for the wallet.
    #[must_use]
    pub fn is_balances_loading(&self, id: &WalletId) -> bool {
        self.lock()
            .balances_loading
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    // ── Deletion ────────────────────────────────────────────────────────

    /// Removes the wallet from every map, the roster, and the persisted
    /// namespace. Deletion is total: no per-wallet residue remains. Returns
    /// whether the deleted wallet was the active one (the caller resets the
    /// pointer and state machine).
    pub async fn purge_wallet(&self, id: &WalletId) -> bool {
        let was_active = {
            let mut inner = self.lock();
            inner.addresses.remove(id);
            inner.balances.remove(id);
            inner.balances_loading.remove(id);
            inner.wallets.remove(id);
            inner.active.as_ref() == Some(id)
        };
        self.persist_roster().await;
        self.scoped.remove(id, ADDRESSES_KEY).await;
        self.scoped.remove(id, BALANCES_KEY).await;
        self.scoped.forget(id).await;
        if was_active {
            self.clear_active().await;
        }
        was_active
    }

    // ── Persistence helpers ─────────────────────────────────────────────

    async fn read_roster(&self) -> Vec<PersistedRosterEntry> {
        match self.kv.get_item(ROSTER_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|err| {
                log::warn!("unreadable persisted roster, starting empty: {err}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("failed to read persisted roster: {err}");
                Vec::new()
            }
        }
    }

    async fn persist_roster(&self) {
        let entries: Vec<PersistedRosterEntry> = {
            let inner = self.lock();
            inner
                .wallets
                .iter()
                .map(|(id, exists)| PersistedRosterEntry {
                    id: id.clone(),
                    exists: *exists,
                })
                .collect()
        };
        match serde_json::to_string(&entries) {
            Ok(json) => {
                if let Err(err) = self.kv.set_item(ROSTER_KEY, &json).await {
                    log::warn!("failed to persist roster: {err}");
                }
            }
            Err(err) => log::warn!("failed to serialize roster: {err}"),
        }
    }

    async fn read_scoped_json<T: serde::de::DeserializeOwned>(
        &self,
        id: &WalletId,
        key: &str,
    ) -> Option<T> {
        let json = self.scoped.read(id, key).await?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("unreadable persisted map {id}/{key}: {err}");
                None
            }
        }
    }

    async fn persist_scoped_json<T: Serialize>(&self, id: &WalletId, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.scoped.write(id, key, &json).await,
            Err(err) => log::warn!("failed to serialize {id}/{key}: {err}"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
