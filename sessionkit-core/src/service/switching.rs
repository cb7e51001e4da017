//! Wallet switching protocol.
//!
//! Switching is all-or-nothing from every observer's perspective: the active
//! identifier moves only after the worklet session has been re-initialized
//! with the new wallet's credentials, and any failure before that point
//! leaves the pointer untouched.

use crate::error::{SessionError, SessionResult};
use crate::state::WalletLoadingState;
use crate::types::WalletId;

use super::{WalletService, OP_SWITCH, OP_UNLOCK};

impl WalletService {
    /// Switches the active session to `id`.
    ///
    /// If `id` is already active with a live session, this returns
    /// immediately without any vault or worklet call. Otherwise the switch
    /// runs under the operation mutex: existence check, credential load
    /// (cache first), worklet session re-initialization, then the atomic
    /// activation step.
    ///
    /// # Errors
    ///
    /// [`SessionError::WalletNotFound`] when the vault holds no material for
    /// `id` — the active identifier and the state machine are left
    /// untouched. [`SessionError::OperationConflict`] /
    /// [`SessionError::OperationTimeout`] from the mutex. Authentication and
    /// transport failures are recorded into the state machine's `Error`
    /// variant and returned.
    pub async fn switch_to_wallet(&self, id: &WalletId) -> SessionResult<()> {
        let already_active = self.active_wallet().as_ref() == Some(id)
            && matches!(
                self.loading_state(),
                WalletLoadingState::Ready { id: ref ready } if ready == id
            );
        if already_active {
            log::debug!("switch requested for already-active wallet: {id}");
            return Ok(());
        }
        let result = self
            .session
            .op_mutex
            .run_exclusive(OP_SWITCH, self.load_session(id))
            .await;
        self.record_timeout(id, result)
    }

    /// Loads the session for `id` without the already-active fast path.
    ///
    /// Used after process start, when the persisted active pointer names a
    /// wallet whose session is not loaded (every process begins at
    /// `NotLoaded` with an empty credential cache).
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::switch_to_wallet`].
    pub async fn unlock_wallet(&self, id: &WalletId) -> SessionResult<()> {
        let result = self
            .session
            .op_mutex
            .run_exclusive(OP_UNLOCK, self.load_session(id))
            .await;
        self.record_timeout(id, result)
    }

    /// The shared load path behind switch and unlock. Must be called while
    /// holding the operation mutex.
    async fn load_session(&self, id: &WalletId) -> SessionResult<()> {
        // Existence is verified before any state transition so a not-found
        // rejection leaves the machine exactly as it was.
        match self.vault.exists(id).await {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::WalletNotFound(id.clone())),
            Err(err) => {
                self.record_failure(Some(id.clone()), &err);
                return Err(err);
            }
        }

        let result = self.load_session_steps(id).await;
        if let Err(ref err) = result {
            self.record_failure(Some(id.clone()), err);
        }
        result
    }

    async fn load_session_steps(&self, id: &WalletId) -> SessionResult<()> {
        self.session
            .machine
            .transition(WalletLoadingState::Checking { id: id.clone() })?;

        self.ensure_worklet_started().await?;
        let credentials = self.load_credentials(id, false).await?;

        self.session.machine.transition(WalletLoadingState::Loading {
            id: id.clone(),
            wallet_exists: true,
        })?;

        let encryption_key = credentials
            .encryption_key
            .as_ref()
            .ok_or_else(|| SessionError::CredentialsUnavailable(id.clone()))?;
        let encrypted_seed = credentials
            .encrypted_seed
            .as_ref()
            .ok_or_else(|| SessionError::CredentialsUnavailable(id.clone()))?;
        self.worklet
            .initialize_session(encryption_key, encrypted_seed)
            .await?;

        self.finish_activation(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::CredentialCache;
    use crate::platform::memory::MemoryPlatform;
    use crate::state::{SessionState, TransitionPolicy};
    use crate::store::WalletDataStore;
    use crate::types::{MnemonicWordCount, WorkletConfig};

    use super::*;

    struct Fixture {
        platform: MemoryPlatform,
        session: Arc<SessionState>,
        store: Arc<WalletDataStore>,
        service: WalletService,
    }

    fn fixture() -> Fixture {
        let platform = MemoryPlatform::new();
        let session = SessionState::shared(TransitionPolicy::Strict);
        let store = Arc::new(WalletDataStore::new(platform.kv.clone()));
        let service = WalletService::new(
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::new(CredentialCache::new()),
            platform.worklet.clone(),
            platform.vault.clone(),
            WorkletConfig::default(),
        );
        Fixture {
            platform,
            session,
            store,
            service,
        }
    }

    fn id(s: &str) -> WalletId {
        WalletId::new(s)
    }

    #[tokio::test]
    async fn test_switch_to_nonexistent_wallet_leaves_everything_unchanged() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        let state_before = fx.session.machine.state();

        let err = fx.service.switch_to_wallet(&id("bob")).await.unwrap_err();
        assert_eq!(err.to_string(), "does not exist: bob");
        assert_eq!(fx.service.active_wallet(), Some(id("alice")));
        assert_eq!(fx.session.machine.state(), state_before);
    }

    #[tokio::test]
    async fn test_switch_to_already_active_wallet_makes_no_calls() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        let vault_calls = fx.platform.vault.total_calls();
        let worklet_calls = fx.platform.worklet.total_calls();

        fx.service.switch_to_wallet(&id("alice")).await.unwrap();
        assert_eq!(fx.platform.vault.total_calls(), vault_calls);
        assert_eq!(fx.platform.worklet.total_calls(), worklet_calls);
    }

    #[tokio::test]
    async fn test_switch_moves_active_pointer_and_clears_previous_credentials() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        fx.service
            .create_wallet(&id("bob"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        assert_eq!(fx.service.active_wallet(), Some(id("bob")));

        let read_calls = fx.platform.vault.read_calls();
        // Activating bob evicted alice's primed credentials, so switching
        // back costs one vault read.
        fx.service.switch_to_wallet(&id("alice")).await.unwrap();
        assert_eq!(fx.service.active_wallet(), Some(id("alice")));
        assert_eq!(
            fx.session.machine.state(),
            WalletLoadingState::Ready { id: id("alice") }
        );
        assert_eq!(fx.platform.vault.read_calls(), read_calls + 1);

        // Bob's credentials were evicted by that switch in turn; switching
        // back needs another fresh read.
        fx.service.switch_to_wallet(&id("bob")).await.unwrap();
        assert_eq!(fx.platform.vault.read_calls(), read_calls + 2);
    }

    #[tokio::test]
    async fn test_switch_failure_leaves_active_pointer_untouched() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        fx.service
            .create_wallet(&id("bob"), MnemonicWordCount::Twelve)
            .await
            .unwrap();

        fx.platform.worklet.fail_next_init("sandbox crashed");
        let err = fx.service.switch_to_wallet(&id("alice")).await.unwrap_err();
        assert!(matches!(err, SessionError::Worklet(_)));
        assert_eq!(fx.service.active_wallet(), Some(id("bob")));
        assert!(matches!(
            fx.session.machine.state(),
            WalletLoadingState::Error { id: Some(ref failed), .. } if *failed == id("alice")
        ));
        // The mutex is free again after the failure.
        assert!(!fx.session.op_mutex.is_operation_in_progress());
    }

    #[tokio::test]
    async fn test_switch_declined_authentication() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        fx.service
            .create_wallet(&id("bob"), MnemonicWordCount::Twelve)
            .await
            .unwrap();

        // Expire alice's cached credentials so the switch must hit the vault.
        fx.service.clear_sensitive_data();
        fx.platform.vault.set_authenticate_allowed(false);

        let err = fx.service.switch_to_wallet(&id("alice")).await.unwrap_err();
        assert!(matches!(err, SessionError::AuthenticationDeclined));
        assert_eq!(fx.service.active_wallet(), Some(id("bob")));
    }

    #[tokio::test]
    async fn test_unlock_restores_session_after_restart() {
        let platform = MemoryPlatform::new();
        let first_session = SessionState::shared(TransitionPolicy::Strict);
        let first_store = Arc::new(WalletDataStore::new(platform.kv.clone()));
        let first = WalletService::new(
            Arc::clone(&first_session),
            Arc::clone(&first_store),
            Arc::new(CredentialCache::new()),
            platform.worklet.clone(),
            platform.vault.clone(),
            WorkletConfig::default(),
        );
        first
            .create_wallet(&id("alice"), MnemonicWordCount::Twelve)
            .await
            .unwrap();

        // Simulated restart: fresh session container, store, and cache over
        // the same vault and key-value store.
        let session = SessionState::shared(TransitionPolicy::Strict);
        let store = Arc::new(WalletDataStore::new(platform.kv.clone()));
        store.load().await;
        let service = WalletService::new(
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::new(CredentialCache::new()),
            platform.worklet.clone(),
            platform.vault.clone(),
            WorkletConfig::default(),
        );

        assert_eq!(session.machine.state(), WalletLoadingState::NotLoaded);
        assert_eq!(store.active_wallet(), Some(id("alice")));

        let read_calls = platform.vault.read_calls();
        service.unlock_wallet(&id("alice")).await.unwrap();
        assert_eq!(
            session.machine.state(),
            WalletLoadingState::Ready { id: id("alice") }
        );
        // The fresh credential cache forced a vault read.
        assert_eq!(platform.vault.read_calls(), read_calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_switches_reject_second_before_its_worklet_call() {
        let fx = fixture();
        fx.service
            .create_wallet(&id("wallet-1"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        fx.service
            .create_wallet(&id("wallet-2"), MnemonicWordCount::Twelve)
            .await
            .unwrap();
        fx.service.unlock_wallet(&id("wallet-1")).await.unwrap();

        let init_calls_before = fx.platform.worklet.initialize_session_calls();
        fx.platform.worklet.set_init_delay(Duration::from_millis(100));

        let service = Arc::new(fx.service);
        let first_service = Arc::clone(&service);
        let first = tokio::spawn(async move {
            first_service.switch_to_wallet(&id("wallet-2")).await
        });
        // Let the first switch reach its (slow) worklet call.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = service.switch_to_wallet(&id("wallet-1")).await;
        match second.unwrap_err() {
            SessionError::OperationConflict { requested, current } => {
                assert_eq!(requested, OP_SWITCH);
                assert_eq!(current, OP_SWITCH);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The rejected switch never reached the worklet.
        assert_eq!(
            fx.platform.worklet.initialize_session_calls(),
            init_calls_before + 1
        );

        first.await.unwrap().unwrap();
        assert_eq!(service.active_wallet(), Some(id("wallet-2")));
        assert_eq!(
            fx.platform.worklet.initialize_session_calls(),
            init_calls_before + 1
        );
    }
}
