//! Vault service trait.

use async_trait::async_trait;

use crate::error::SessionResult;
use crate::types::{EncryptedMaterial, StoredMaterial, WalletId};

/// Platform secure credential store gated by biometric authentication.
///
/// Records are keyed by wallet identifier. Reading material back may prompt
/// the user, which is why callers prefer the credential cache over a fresh
/// `read_all`.
#[async_trait]
pub trait VaultService: Send + Sync {
    /// Prompts for authentication. Returns `false` when the user declines.
    async fn authenticate(&self) -> SessionResult<bool>;

    /// Whether material for this identifier is stored.
    async fn exists(&self, id: &WalletId) -> SessionResult<bool>;

    /// Stores the full encrypted material bundle under the identifier.
    async fn write_all(
        &self,
        id: &WalletId,
        material: &EncryptedMaterial,
    ) -> SessionResult<()>;

    /// Reads back whatever material is stored for the identifier. The result
    /// may be partial (older records can lack entropy).
    async fn read_all(&self, id: &WalletId) -> SessionResult<StoredMaterial>;

    /// Removes all material stored under the identifier.
    async fn delete(&self, id: &WalletId) -> SessionResult<()>;
}
