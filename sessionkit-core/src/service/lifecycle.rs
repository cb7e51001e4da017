//! Wallet lifecycle operations: create, import, delete, reveal.
//!
//! Create and import share one provisioning path: encrypted material from
//! the worklet is persisted to the vault, the credential cache is primed so
//! the immediate session initialization needs no second vault prompt, and
//! the new wallet becomes active. Delete is total: vault material, every
//! data-store namespace, cached credentials, and the storage handle all go
//! in one operation.

use crate::cache::CachedCredentials;
use crate::error::{SessionError, SessionResult};
use crate::state::WalletLoadingState;
use crate::types::{EncryptedMaterial, MnemonicWordCount, WalletId};
use zeroize::Zeroizing;

use super::{WalletService, OP_CREATE, OP_DELETE, OP_IMPORT, OP_REVEAL};

impl WalletService {
    /// Creates a new wallet from fresh worklet entropy, marks it active,
    /// and leaves the machine in `Ready`.
    ///
    /// # Errors
    ///
    /// [`SessionError::WalletAlreadyExists`] when the vault already holds
    /// the identifier (machine untouched); mutex conflicts/timeouts;
    /// worklet and vault failures, which are recorded as `Error` state.
    pub async fn create_wallet(
        &self,
        id: &WalletId,
        word_count: MnemonicWordCount,
    ) -> SessionResult<()> {
        let result = self
            .session
            .op_mutex
            .run_exclusive(OP_CREATE, async {
                self.provision(id, || async {
                    self.worklet.generate_entropy_and_encrypt(word_count).await
                })
                .await
            })
            .await;
        self.record_timeout(id, result)
    }

    /// Imports a wallet from a recovery phrase. Same persistence and
    /// activation path as [`Self::create_wallet`].
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::create_wallet`]; an invalid phrase surfaces
    /// as a worklet failure.
    pub async fn import_wallet(&self, id: &WalletId, phrase: &str) -> SessionResult<()> {
        let result = self
            .session
            .op_mutex
            .run_exclusive(OP_IMPORT, async {
                self.provision(id, || async {
                    self.worklet.seed_from_mnemonic(phrase).await
                })
                .await
            })
            .await;
        self.record_timeout(id, result)
    }

    /// Deletes a wallet entirely: vault material, addresses, balances,
    /// loading flags, roster entry, cached credentials, and storage handle.
    /// Deleting the active wallet clears the pointer and resets the machine
    /// to `NotLoaded`.
    ///
    /// # Errors
    ///
    /// [`SessionError::WalletNotFound`] when the vault holds no material for
    /// the identifier (machine untouched); mutex conflicts/timeouts; vault
    /// failures, which are recorded as `Error` state.
    pub async fn delete_wallet(&self, id: &WalletId) -> SessionResult<()> {
        self.session
            .op_mutex
            .run_exclusive(OP_DELETE, async {
                match self.vault.exists(id).await {
                    Ok(true) => {}
                    Ok(false) => return Err(SessionError::WalletNotFound(id.clone())),
                    Err(err) => {
                        self.record_failure(Some(id.clone()), &err);
                        return Err(err);
                    }
                }
                let result = self.delete_steps(id).await;
                if let Err(ref err) = result {
                    self.record_failure(Some(id.clone()), err);
                }
                result
            })
            .await
    }

    async fn delete_steps(&self, id: &WalletId) -> SessionResult<()> {
        self.vault.delete(id).await?;
        self.credentials.clear_wallet(id);
        let was_active = self.store.purge_wallet(id).await;
        if was_active {
            self.session.machine.force_reset();
        }
        log::debug!("deleted wallet: {id}");
        Ok(())
    }

    /// Reconstructs the recovery phrase for a stored wallet.
    ///
    /// Runs under the operation mutex because it decrypts secret material.
    /// Prefers cached credentials; falls back to an authenticated vault
    /// read.
    ///
    /// # Errors
    ///
    /// [`SessionError::WalletNotFound`] for unknown identifiers (machine
    /// untouched); [`SessionError::CredentialsUnavailable`] when the vault
    /// record lacks entropy; authentication and transport failures, which
    /// are recorded as `Error` state.
    pub async fn reveal_recovery_phrase(&self, id: &WalletId) -> SessionResult<String> {
        self.session
            .op_mutex
            .run_exclusive(OP_REVEAL, async {
                match self.vault.exists(id).await {
                    Ok(true) => {}
                    Ok(false) => return Err(SessionError::WalletNotFound(id.clone())),
                    Err(err) => {
                        self.record_failure(Some(id.clone()), &err);
                        return Err(err);
                    }
                }
                let result = self.reveal_steps(id).await;
                if let Err(ref err) = result {
                    self.record_failure(Some(id.clone()), err);
                }
                result
            })
            .await
    }

    async fn reveal_steps(&self, id: &WalletId) -> SessionResult<String> {
        self.ensure_worklet_started().await?;
        let credentials = self.load_credentials(id, true).await?;
        let encryption_key = credentials
            .encryption_key
            .as_ref()
            .ok_or_else(|| SessionError::CredentialsUnavailable(id.clone()))?;
        let encrypted_entropy = credentials
            .encrypted_entropy
            .as_ref()
            .ok_or_else(|| SessionError::CredentialsUnavailable(id.clone()))?;
        self.worklet
            .mnemonic_from_entropy(encrypted_entropy, encryption_key)
            .await
    }

    /// Shared create/import path. Must be called while holding the
    /// operation mutex.
    async fn provision<F, Fut>(&self, id: &WalletId, material_source: F) -> SessionResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = SessionResult<EncryptedMaterial>>,
    {
        match self.vault.exists(id).await {
            Ok(false) => {}
            Ok(true) => return Err(SessionError::WalletAlreadyExists(id.clone())),
            Err(err) => {
                self.record_failure(Some(id.clone()), &err);
                return Err(err);
            }
        }
        let result = self.provision_steps(id, material_source).await;
        if let Err(ref err) = result {
            self.record_failure(Some(id.clone()), err);
        }
        result
    }

    async fn provision_steps<F, Fut>(
        &self,
        id: &WalletId,
        material_source: F,
    ) -> SessionResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = SessionResult<EncryptedMaterial>>,
    {
        self.session.machine.transition(WalletLoadingState::Loading {
            id: id.clone(),
            wallet_exists: false,
        })?;

        self.ensure_worklet_started().await?;
        let material = material_source().await?;
        self.vault.write_all(id, &material).await?;

        // Prime the cache so the session initialization below and the next
        // few operations skip the vault prompt.
        self.credentials.set(
            id,
            CachedCredentials {
                encryption_key: Some(Zeroizing::new(material.encryption_key.clone())),
                encrypted_seed: Some(material.encrypted_seed.clone()),
                encrypted_entropy: Some(material.encrypted_entropy.clone()),
            },
        );

        self.worklet
            .initialize_session(&material.encryption_key, &material.encrypted_seed)
            .await?;

        self.finish_activation(id).await
    }
}
