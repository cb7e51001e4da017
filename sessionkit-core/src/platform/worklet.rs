//! Worklet service trait.

use async_trait::async_trait;

use crate::error::SessionResult;
use crate::types::{EncryptedMaterial, MnemonicWordCount, WorkletConfig};

/// The external sandboxed execution environment performing key derivation
/// and session management.
///
/// The worklet is an opaque asynchronous peer: seeds and entropy never leave
/// it decrypted, and the coordination layer only shuttles encrypted material
/// between it and the vault.
#[async_trait]
pub trait WorkletService: Send + Sync {
    /// Starts the worklet. Must be idempotent: starting an already-running
    /// worklet succeeds without side effects.
    async fn start(&self, config: WorkletConfig) -> SessionResult<()>;

    /// (Re)initializes the worklet's cryptographic session with the given
    /// credentials, replacing any previous session.
    async fn initialize_session(
        &self,
        encryption_key: &[u8],
        encrypted_seed: &[u8],
    ) -> SessionResult<()>;

    /// Generates fresh entropy for a new wallet and returns it encrypted
    /// alongside the encryption key.
    async fn generate_entropy_and_encrypt(
        &self,
        word_count: MnemonicWordCount,
    ) -> SessionResult<EncryptedMaterial>;

    /// Converts a recovery phrase into encrypted seed/entropy material.
    async fn seed_from_mnemonic(&self, phrase: &str) -> SessionResult<EncryptedMaterial>;

    /// Reconstructs the recovery phrase from encrypted entropy.
    async fn mnemonic_from_entropy(
        &self,
        encrypted_entropy: &[u8],
        encryption_key: &[u8],
    ) -> SessionResult<String>;
}
