//! Common test utilities shared across integration tests.

use std::sync::Arc;

use sessionkit_core::cache::CredentialCache;
use sessionkit_core::platform::MemoryPlatform;
use sessionkit_core::{
    SessionState, TransitionPolicy, WalletDataStore, WalletId, WalletService, WorkletConfig,
};

/// A full service wired over in-memory platform collaborators. The platform
/// handle stays accessible so tests can inspect call counters and inject
/// failures.
pub struct Harness {
    pub platform: MemoryPlatform,
    pub session: Arc<SessionState>,
    pub store: Arc<WalletDataStore>,
    pub credentials: Arc<CredentialCache>,
    pub service: WalletService,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::over(MemoryPlatform::new())
    }

    /// Builds a fresh service stack over an existing platform. Used to
    /// simulate a process restart: vault and key-value contents survive,
    /// session state and caches do not.
    #[must_use]
    pub fn over(platform: MemoryPlatform) -> Self {
        let session = SessionState::shared(TransitionPolicy::Strict);
        let store = Arc::new(WalletDataStore::new(platform.kv.clone()));
        let credentials = Arc::new(CredentialCache::new());
        let service = WalletService::new(
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::clone(&credentials),
            platform.worklet.clone(),
            platform.vault.clone(),
            WorkletConfig::default(),
        );
        Self {
            platform,
            session,
            store,
            credentials,
            service,
        }
    }

    /// Restart simulation: same vault and key-value store, everything else
    /// fresh. Hydrates the data store from persistence, as a real process
    /// start would.
    pub async fn restart(self) -> Self {
        let next = Self::over(self.platform);
        next.store.load().await;
        next
    }
}

#[must_use]
pub fn id(s: &str) -> WalletId {
    WalletId::new(s)
}
