//! Single-flight execution guard for mutating wallet operations.
//!
//! Exactly one mutating operation (create, unlock, switch, import, delete)
//! may run at a time across independently invoked call sites. Rejected
//! callers are told which operation blocked them and must decide to retry —
//! there is no queue and no backoff. A timeout force-releases the lock so it
//! can never be held past its deadline.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{SessionError, SessionResult};

/// Default deadline for an exclusive operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Whether the caller now holds the mutex.
    pub acquired: bool,
    /// The operation currently holding the mutex. On a successful acquire
    /// this is the caller's own operation name.
    pub current_operation: Option<String>,
}

#[derive(Default)]
struct MutexState {
    in_progress: bool,
    current_operation: Option<String>,
}

/// Single-flight operation mutex with named holders.
///
/// The holder name is the only authorization token for release: a release
/// with a non-matching name is a no-op, which protects against a stale
/// caller double-releasing a lock that has since been reacquired.
#[derive(Default)]
pub struct OperationMutex {
    state: Mutex<MutexState>,
}

impl OperationMutex {
    /// Creates an unheld mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the mutex for the named operation.
    ///
    /// On failure the outcome carries the blocking operation's name so the
    /// caller can surface a meaningful conflict.
    pub fn acquire(&self, operation: &str) -> AcquireOutcome {
        let mut state = self.lock();
        if state.in_progress {
            return AcquireOutcome {
                acquired: false,
                current_operation: state.current_operation.clone(),
            };
        }
        state.in_progress = true;
        state.current_operation = Some(operation.to_string());
        AcquireOutcome {
            acquired: true,
            current_operation: state.current_operation.clone(),
        }
    }

    /// Releases the mutex if `operation` matches the recorded holder;
    /// otherwise leaves the state unchanged.
    pub fn release(&self, operation: &str) {
        let mut state = self.lock();
        if state.current_operation.as_deref() == Some(operation) {
            state.in_progress = false;
            state.current_operation = None;
        }
    }

    /// Releases the mutex regardless of holder. Teardown hook only.
    pub fn force_release(&self) {
        let mut state = self.lock();
        state.in_progress = false;
        state.current_operation = None;
    }

    /// Whether any operation currently holds the mutex.
    #[must_use]
    pub fn is_operation_in_progress(&self) -> bool {
        self.lock().in_progress
    }

    /// Name of the operation currently holding the mutex, if any.
    #[must_use]
    pub fn current_operation(&self) -> Option<String> {
        self.lock().current_operation.clone()
    }

    /// Runs `op` while exclusively holding the mutex, with the default
    /// 30-second deadline.
    ///
    /// # Errors
    ///
    /// [`SessionError::OperationConflict`] if the mutex is held;
    /// [`SessionError::OperationTimeout`] if `op` misses the deadline; any
    /// error returned by `op` itself.
    pub async fn run_exclusive<T, F>(
        &self,
        operation: &str,
        op: F,
    ) -> SessionResult<T>
    where
        F: Future<Output = SessionResult<T>>,
    {
        self.run_exclusive_with_timeout(operation, DEFAULT_OPERATION_TIMEOUT, op)
            .await
    }

    /// Runs `op` while exclusively holding the mutex, racing it against
    /// `timeout`.
    ///
    /// On timeout the in-flight future is dropped and the mutex is released
    /// *before* the timeout error propagates, guaranteeing the lock is never
    /// held past its deadline. On completion or an error inside `op`, release
    /// occurs exactly once.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run_exclusive`].
    pub async fn run_exclusive_with_timeout<T, F>(
        &self,
        operation: &str,
        timeout: Duration,
        op: F,
    ) -> SessionResult<T>
    where
        F: Future<Output = SessionResult<T>>,
    {
        let outcome = self.acquire(operation);
        if !outcome.acquired {
            return Err(SessionError::OperationConflict {
                requested: operation.to_string(),
                current: outcome
                    .current_operation
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let raced = tokio::time::timeout(timeout, op).await;
        self.release(operation);
        match raced {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "operation mutex force-released after timeout: {operation}"
                );
                Err(SessionError::OperationTimeout {
                    operation: operation.to_string(),
                })
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MutexState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
