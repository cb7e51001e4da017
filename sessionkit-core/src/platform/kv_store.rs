//! Durable non-sensitive key-value store trait.

use async_trait::async_trait;

use crate::error::SessionResult;

/// Durable key-value store for non-sensitive, reconstructable data.
///
/// Used only for address/balance/roster persistence. Secrets never pass
/// through this interface.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get_item(&self, key: &str) -> SessionResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> SessionResult<()>;

    /// Removes the value stored under `key`, if any.
    async fn remove_item(&self, key: &str) -> SessionResult<()>;
}
