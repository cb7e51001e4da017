//! Wallet service: the switching protocol and lifecycle operations.
//!
//! `WalletService` composes the session state container, the wallet data
//! store, the credential cache, and the worklet/vault collaborators. Every
//! mutating operation runs under the single-flight operation mutex; read
//! accessors pass straight through to the underlying snapshots.
//!
//! The switching protocol lives in [`switching`], the create/import/delete
//! operations in [`lifecycle`].

mod lifecycle;
mod switching;

use std::sync::Arc;

use crate::cache::{CachedCredentials, CredentialCache};
use crate::error::{SessionError, SessionResult};
use crate::platform::{VaultService, WorkletService};
use crate::state::{SessionState, WalletLoadingState};
use crate::store::WalletDataStore;
use crate::types::{WalletId, WalletInfo, WorkletConfig};

pub(crate) const OP_CREATE: &str = "createWallet";
pub(crate) const OP_IMPORT: &str = "importWallet";
pub(crate) const OP_SWITCH: &str = "switchToWallet";
pub(crate) const OP_UNLOCK: &str = "unlockWallet";
pub(crate) const OP_DELETE: &str = "deleteWallet";
pub(crate) const OP_REVEAL: &str = "revealRecoveryPhrase";

/// Coordinates wallet sessions across the worklet, the vault, and the local
/// stores.
pub struct WalletService {
    session: Arc<SessionState>,
    store: Arc<WalletDataStore>,
    credentials: Arc<CredentialCache>,
    worklet: Arc<dyn WorkletService>,
    vault: Arc<dyn VaultService>,
    worklet_config: WorkletConfig,
}

impl WalletService {
    /// Creates a service over the given state container, stores, and
    /// collaborators. Callers keep their own clones of the `Arc`s for
    /// direct snapshot reads.
    #[must_use]
    pub fn new(
        session: Arc<SessionState>,
        store: Arc<WalletDataStore>,
        credentials: Arc<CredentialCache>,
        worklet: Arc<dyn WorkletService>,
        vault: Arc<dyn VaultService>,
        worklet_config: WorkletConfig,
    ) -> Self {
        Self {
            session,
            store,
            credentials,
            worklet,
            vault,
            worklet_config,
        }
    }

    /// Snapshot of the loading state.
    #[must_use]
    pub fn loading_state(&self) -> WalletLoadingState {
        self.session.machine.state()
    }

    /// The active wallet identifier, if any.
    #[must_use]
    pub fn active_wallet(&self) -> Option<WalletId> {
        self.store.active_wallet()
    }

    /// Current wallet roster.
    #[must_use]
    pub fn roster(&self) -> Vec<WalletInfo> {
        self.store.roster()
    }

    /// Drops every cached credential ("clear all sensitive data").
    pub fn clear_sensitive_data(&self) {
        self.credentials.clear_all();
    }

    /// Starts the worklet. Safe to call repeatedly; the worklet contract
    /// makes `start` idempotent.
    pub(crate) async fn ensure_worklet_started(&self) -> SessionResult<()> {
        self.worklet.start(self.worklet_config.clone()).await
    }

    /// Loads session credentials for `id`, preferring the credential cache
    /// over a fresh vault read (which authenticates and may prompt the
    /// user). A fresh read refreshes the cache.
    ///
    /// The returned credentials always carry an encryption key and an
    /// encrypted seed; entropy is additionally required when
    /// `need_entropy` is set.
    pub(crate) async fn load_credentials(
        &self,
        id: &WalletId,
        need_entropy: bool,
    ) -> SessionResult<CachedCredentials> {
        if let Some(cached) = self.credentials.get(id) {
            let complete = cached.encryption_key.is_some()
                && cached.encrypted_seed.is_some()
                && (!need_entropy || cached.encrypted_entropy.is_some());
            if complete {
                log::debug!("credential cache hit: {id}");
                return Ok(cached);
            }
        }

        if !self.vault.authenticate().await? {
            return Err(SessionError::AuthenticationDeclined);
        }
        let stored = self.vault.read_all(id).await?;
        let credentials = CachedCredentials {
            encryption_key: stored.encryption_key,
            encrypted_seed: stored.encrypted_seed,
            encrypted_entropy: stored.encrypted_entropy,
        };
        if credentials.encryption_key.is_none() || credentials.encrypted_seed.is_none() {
            return Err(SessionError::CredentialsUnavailable(id.clone()));
        }
        self.credentials.set(id, credentials.clone());
        Ok(credentials)
    }

    /// Records a failure into the state machine so reactive observers have
    /// something to display. `Error` is an always-legal target.
    pub(crate) fn record_failure(&self, id: Option<WalletId>, err: &SessionError) {
        let _ = self.session.machine.transition(WalletLoadingState::Error {
            id,
            message: err.to_string(),
        });
    }

    /// A timed-out operation is abandoned mid-flight, which can leave the
    /// machine in `Checking` or `Loading`. Record the timeout as an `Error`
    /// state so a retry has a legal starting point. Conflicts are left
    /// alone: the machine belongs to the operation still running.
    pub(crate) fn record_timeout(
        &self,
        id: &WalletId,
        result: SessionResult<()>,
    ) -> SessionResult<()> {
        if let Err(ref err @ SessionError::OperationTimeout { .. }) = result {
            self.record_failure(Some(id.clone()), err);
        }
        result
    }

    /// Marks `id` active, evicts the previous wallet's cached credentials,
    /// and transitions to `Ready`. Called only after the worklet session has
    /// been initialized successfully.
    pub(crate) async fn finish_activation(&self, id: &WalletId) -> SessionResult<()> {
        let previous = self.store.active_wallet();
        self.store.register_wallet(id).await;
        self.store.set_active(id).await;
        // Never hold two wallets' secrets decrypted longer than necessary.
        if let Some(previous) = previous.filter(|previous| previous != id) {
            self.credentials.clear_wallet(&previous);
        }
        self.session
            .machine
            .transition(WalletLoadingState::Ready { id: id.clone() })
    }
}
