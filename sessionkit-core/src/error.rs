use thiserror::Error;

use crate::types::WalletId;

/// Result type alias for session coordination operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error outputs from `SessionKit`.
///
/// The taxonomy is deliberate: conflicts and timeouts are distinct so callers
/// can choose to retry a timeout but must not auto-retry a conflict; transport
/// failures from the worklet and vault are propagated unmodified.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A mutating operation was rejected because another one holds the
    /// operation mutex. Never auto-retried.
    #[error("operation_conflict: {requested} blocked by {current}")]
    OperationConflict {
        /// Name of the operation that was rejected.
        requested: String,
        /// Name of the operation currently holding the mutex.
        current: String,
    },

    /// A mutating operation exceeded its deadline. The mutex has already been
    /// force-released when this error surfaces.
    #[error("operation_timeout: {operation}")]
    OperationTimeout {
        /// Name of the timed-out operation.
        operation: String,
    },

    /// A wallet with this identifier is already stored in the vault.
    #[error("already exists: {0}")]
    WalletAlreadyExists(WalletId),

    /// No wallet with this identifier is stored in the vault.
    #[error("does not exist: {0}")]
    WalletNotFound(WalletId),

    /// The vault declined authentication (e.g. biometric prompt dismissed).
    #[error("authentication_declined")]
    AuthenticationDeclined,

    /// A state machine transition not listed as legal was attempted under the
    /// strict policy.
    #[error("illegal_transition: {from} -> {to}")]
    IllegalTransition {
        /// Name of the state the machine was in.
        from: &'static str,
        /// Name of the state the transition targeted.
        to: &'static str,
    },

    /// The vault record for this wallet is missing the material required for
    /// the requested operation.
    #[error("credentials_unavailable: {0}")]
    CredentialsUnavailable(WalletId),

    /// Failure reported by the worklet.
    #[error("worklet_error: {0}")]
    Worklet(String),

    /// Failure reported by the vault.
    #[error("vault_error: {0}")]
    Vault(String),

    /// Failure in the durable non-sensitive key-value store.
    #[error("storage_error: {0}")]
    Storage(String),

    /// Unexpected error serializing persisted state.
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
