//! Wallet loading state machine and the injectable session state container.
//!
//! Exactly one [`WalletLoadingState`] instance exists per [`SessionState`]
//! container and it is mutated only through validated transitions. The
//! illegal-transition policy is an explicit constructor parameter so both
//! behaviors (strict raise, lenient log-and-apply) are exercised directly by
//! tests instead of inferred from a build-mode flag.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{SessionError, SessionResult};
use crate::op_mutex::OperationMutex;
use crate::types::WalletId;

/// Process-wide description of which wallet is becoming active and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletLoadingState {
    /// No session is loaded. Initial state and safe reset target.
    NotLoaded,
    /// Verifying that the wallet can be loaded (vault existence, credentials).
    Checking {
        /// The wallet being checked.
        id: WalletId,
    },
    /// Materializing the worklet session.
    Loading {
        /// The wallet being loaded.
        id: WalletId,
        /// Whether vault material for the wallet already existed when loading
        /// began (false during create/import).
        wallet_exists: bool,
    },
    /// The wallet's session is live.
    Ready {
        /// The active wallet.
        id: WalletId,
    },
    /// A load attempt failed. Recorded as data so reactive observers always
    /// have something to display.
    Error {
        /// The wallet involved, when known.
        id: Option<WalletId>,
        /// Human-readable failure description.
        message: String,
    },
}

impl WalletLoadingState {
    /// Short name of the state variant, used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotLoaded => "NotLoaded",
            Self::Checking { .. } => "Checking",
            Self::Loading { .. } => "Loading",
            Self::Ready { .. } => "Ready",
            Self::Error { .. } => "Error",
        }
    }

    /// The identifier currently checking or loading, if any.
    #[must_use]
    pub const fn loading_wallet_id(&self) -> Option<&WalletId> {
        match self {
            Self::Checking { id } | Self::Loading { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Whether the machine should consider a transition legal.
///
/// Escape hatches are always legal: any state may transition to `Error` and
/// any state may transition to `NotLoaded`.
const fn is_legal(from: &WalletLoadingState, to: &WalletLoadingState) -> bool {
    use WalletLoadingState as S;
    match to {
        S::Error { .. } | S::NotLoaded => true,
        S::Checking { .. } => matches!(
            from,
            S::NotLoaded | S::Ready { .. } | S::Error { .. }
        ),
        S::Loading { .. } => matches!(
            from,
            S::NotLoaded
                | S::Checking { .. }
                | S::Ready { .. }
                | S::Error { .. }
        ),
        S::Ready { .. } => matches!(from, S::Loading { .. }),
    }
}

/// Policy applied when a transition not listed as legal is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Illegal transitions return [`SessionError::IllegalTransition`] and the
    /// state is left unchanged.
    Strict,
    /// Illegal transitions are logged and applied anyway.
    Lenient,
}

/// Callback invoked with every applied state change. Observers are notified
/// after the internal lock is released, so a callback may re-enter the
/// machine (read the state, subscribe, unsubscribe).
pub type StateObserver = Arc<dyn Fn(&WalletLoadingState) + Send + Sync>;

/// Handle returned by [`LoadingStateMachine::subscribe`]; pass it back to
/// [`LoadingStateMachine::unsubscribe`] to stop receiving notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

struct MachineInner {
    state: WalletLoadingState,
    observers: HashMap<u64, StateObserver>,
    next_subscription: u64,
}

/// The wallet loading state machine.
///
/// Only applied transitions change the externally visible state and notify
/// subscribers; a strict-mode rejection is invisible to observers.
pub struct LoadingStateMachine {
    policy: TransitionPolicy,
    inner: Mutex<MachineInner>,
}

impl LoadingStateMachine {
    /// Creates a machine in `NotLoaded` with the given transition policy.
    #[must_use]
    pub fn new(policy: TransitionPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(MachineInner {
                state: WalletLoadingState::NotLoaded,
                observers: HashMap::new(),
                next_subscription: 0,
            }),
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> WalletLoadingState {
        self.lock().state.clone()
    }

    /// The identifier currently checking or loading, if any.
    #[must_use]
    pub fn loading_wallet_id(&self) -> Option<WalletId> {
        self.lock().state.loading_wallet_id().cloned()
    }

    /// Attempts a transition to `next`.
    ///
    /// # Errors
    ///
    /// Under [`TransitionPolicy::Strict`], returns
    /// [`SessionError::IllegalTransition`] for transitions not listed as
    /// legal. Under [`TransitionPolicy::Lenient`] the transition is logged
    /// and applied anyway.
    pub fn transition(&self, next: WalletLoadingState) -> SessionResult<()> {
        let mut inner = self.lock();
        if !is_legal(&inner.state, &next) {
            match self.policy {
                TransitionPolicy::Strict => {
                    return Err(SessionError::IllegalTransition {
                        from: inner.state.name(),
                        to: next.name(),
                    });
                }
                TransitionPolicy::Lenient => {
                    log::warn!(
                        "illegal wallet state transition applied: {} -> {}",
                        inner.state.name(),
                        next.name()
                    );
                }
            }
        }
        log::debug!(
            "wallet state: {} -> {}",
            inner.state.name(),
            next.name()
        );
        inner.state = next;
        let state = inner.state.clone();
        // Snapshot and notify outside the lock so observers may re-enter.
        let observers: Vec<StateObserver> = inner.observers.values().cloned().collect();
        drop(inner);
        for observer in &observers {
            observer(&state);
        }
        Ok(())
    }

    /// Forces the machine back to `NotLoaded`, which is legal from any state.
    pub fn force_reset(&self) {
        // Infallible: NotLoaded is an always-legal target.
        let _ = self.transition(WalletLoadingState::NotLoaded);
    }

    /// Registers a callback invoked with every applied state change.
    pub fn subscribe(
        &self,
        observer: impl Fn(&WalletLoadingState) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.observers.insert(id, Arc::new(observer));
        Subscription(id)
    }

    /// Removes a previously registered callback.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.lock().observers.remove(&subscription.0);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MachineInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Explicit, injectable container for the two pieces of shared mutable state:
/// the loading state machine and the operation mutex.
///
/// Pass this into services rather than looking it up ambiently so both pieces
/// remain independently unit-testable. Nothing in the container is ever
/// persisted: every process start begins at `NotLoaded` with the mutex
/// unheld.
pub struct SessionState {
    /// The wallet loading state machine.
    pub machine: LoadingStateMachine,
    /// The single-flight operation mutex.
    pub op_mutex: OperationMutex,
}

impl SessionState {
    /// Creates a fresh container: `NotLoaded`, mutex unheld.
    #[must_use]
    pub fn new(policy: TransitionPolicy) -> Self {
        Self {
            machine: LoadingStateMachine::new(policy),
            op_mutex: OperationMutex::new(),
        }
    }

    /// Creates a shared container.
    #[must_use]
    pub fn shared(policy: TransitionPolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    /// Teardown hook for tests and logout: machine back to `NotLoaded`, mutex
    /// cleared regardless of holder.
    pub fn reset(&self) {
        self.machine.force_reset();
        self.op_mutex.force_release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn id(s: &str) -> WalletId {
        WalletId::new(s)
    }

    fn checking(s: &str) -> WalletLoadingState {
        WalletLoadingState::Checking { id: id(s) }
    }

    fn loading(s: &str) -> WalletLoadingState {
        WalletLoadingState::Loading {
            id: id(s),
            wallet_exists: true,
        }
    }

    fn ready(s: &str) -> WalletLoadingState {
        WalletLoadingState::Ready { id: id(s) }
    }

    fn error(s: &str) -> WalletLoadingState {
        WalletLoadingState::Error {
            id: Some(id(s)),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_legal_transition_table() {
        let legal = [
            (WalletLoadingState::NotLoaded, checking("a")),
            (WalletLoadingState::NotLoaded, loading("a")),
            (checking("a"), loading("a")),
            (checking("a"), error("a")),
            (loading("a"), ready("a")),
            (loading("a"), error("a")),
            (ready("a"), WalletLoadingState::NotLoaded),
            (ready("a"), loading("b")),
            (ready("a"), checking("b")),
            (error("a"), WalletLoadingState::NotLoaded),
            (error("a"), checking("b")),
            (error("a"), loading("b")),
            // escape hatches
            (checking("a"), WalletLoadingState::NotLoaded),
            (loading("a"), WalletLoadingState::NotLoaded),
            (WalletLoadingState::NotLoaded, error("a")),
            (ready("a"), error("a")),
        ];
        for (from, to) in legal {
            assert!(
                is_legal(&from, &to),
                "expected {} -> {} to be legal",
                from.name(),
                to.name()
            );
        }

        let illegal = [
            (WalletLoadingState::NotLoaded, ready("a")),
            (checking("a"), ready("a")),
            (error("a"), ready("a")),
            (ready("a"), ready("b")),
        ];
        for (from, to) in illegal {
            assert!(
                !is_legal(&from, &to),
                "expected {} -> {} to be illegal",
                from.name(),
                to.name()
            );
        }
    }

    #[test]
    fn test_strict_rejects_and_leaves_state_unchanged() {
        let machine = LoadingStateMachine::new(TransitionPolicy::Strict);
        let err = machine.transition(ready("a")).unwrap_err();
        match err {
            SessionError::IllegalTransition { from, to } => {
                assert_eq!(from, "NotLoaded");
                assert_eq!(to, "Ready");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(machine.state(), WalletLoadingState::NotLoaded);
    }

    #[test]
    fn test_lenient_applies_illegal_transition_and_notifies() {
        let machine = LoadingStateMachine::new(TransitionPolicy::Lenient);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        machine.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        machine.transition(ready("a")).unwrap();
        assert_eq!(machine.state(), ready("a"));
        // The applied-anyway transition is visible to subscribers.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_reenter_the_machine() {
        let machine = Arc::new(LoadingStateMachine::new(TransitionPolicy::Strict));
        let machine_clone = Arc::clone(&machine);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        machine.subscribe(move |state| {
            // A re-entrant read during notification must not deadlock and
            // observes the already-applied state.
            assert_eq!(machine_clone.state(), *state);
            seen_clone.lock().unwrap().push(state.name());
        });

        machine.transition(checking("a")).unwrap();
        machine.transition(loading("a")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["Checking", "Loading"]);
    }

    #[test]
    fn test_full_happy_path() {
        let machine = LoadingStateMachine::new(TransitionPolicy::Strict);
        machine.transition(checking("a")).unwrap();
        assert_eq!(machine.loading_wallet_id(), Some(id("a")));
        machine.transition(loading("a")).unwrap();
        machine.transition(ready("a")).unwrap();
        assert_eq!(machine.loading_wallet_id(), None);
        machine.transition(checking("b")).unwrap();
        assert_eq!(machine.loading_wallet_id(), Some(id("b")));
    }

    #[test]
    fn test_subscribers_only_see_applied_transitions() {
        let machine = LoadingStateMachine::new(TransitionPolicy::Strict);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let subscription = machine.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        machine.transition(ready("a")).unwrap_err();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        machine.transition(checking("a")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        machine.unsubscribe(subscription);
        machine.transition(loading("a")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_returns_to_not_loaded() {
        let state = SessionState::new(TransitionPolicy::Strict);
        state.machine.transition(checking("a")).unwrap();
        state.reset();
        assert_eq!(state.machine.state(), WalletLoadingState::NotLoaded);
    }
}
