//! Core type definitions shared across the session coordination layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// An opaque unique string naming one seed/session.
///
/// Identifiers are chosen by the caller and treated as opaque keys; the
/// coordination layer never parses them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    /// Creates a new `WalletId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WalletId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletId({})", self.0)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster entry describing one known wallet.
///
/// Roster membership is independent of whether the wallet's session is
/// currently loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    /// The wallet identifier.
    pub id: WalletId,
    /// Whether encrypted material for this wallet exists in the vault.
    pub exists: bool,
    /// Whether this wallet is the active one.
    pub is_active: bool,
}

/// Encrypted session material produced by the worklet.
///
/// The encryption key is the only decrypted secret in this bundle; seed and
/// entropy stay encrypted at all times outside the worklet.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptedMaterial {
    /// Decrypted encryption key for the worklet session.
    pub encryption_key: Vec<u8>,
    /// Seed bytes, encrypted under `encryption_key`.
    pub encrypted_seed: Vec<u8>,
    /// Entropy bytes, encrypted under `encryption_key`.
    pub encrypted_entropy: Vec<u8>,
}

impl fmt::Debug for EncryptedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("EncryptedMaterial")
            .field("encrypted_seed_len", &self.encrypted_seed.len())
            .field("encrypted_entropy_len", &self.encrypted_entropy.len())
            .finish_non_exhaustive()
    }
}

/// Possibly-partial session material read back from the vault.
///
/// Older vault records may lack the encrypted entropy, so every field is
/// optional and callers check for what they need.
#[derive(Default)]
pub struct StoredMaterial {
    /// Decrypted encryption key, if present.
    pub encryption_key: Option<Zeroizing<Vec<u8>>>,
    /// Encrypted seed bytes, if present.
    pub encrypted_seed: Option<Vec<u8>>,
    /// Encrypted entropy bytes, if present.
    pub encrypted_entropy: Option<Vec<u8>>,
}

impl fmt::Debug for StoredMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredMaterial")
            .field("has_encryption_key", &self.encryption_key.is_some())
            .field("has_encrypted_seed", &self.encrypted_seed.is_some())
            .field("has_encrypted_entropy", &self.encrypted_entropy.is_some())
            .finish()
    }
}

/// Number of words in a generated recovery phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicWordCount {
    /// 12-word phrase (128 bits of entropy).
    Twelve,
    /// 24-word phrase (256 bits of entropy).
    TwentyFour,
}

impl MnemonicWordCount {
    /// Returns the number of words as an integer.
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::Twelve => 12,
            Self::TwentyFour => 24,
        }
    }
}

/// Startup configuration handed to the worklet.
#[derive(Debug, Clone, Default)]
pub struct WorkletConfig {
    /// Opaque endpoint or bundle locator for the sandboxed environment.
    pub endpoint: Option<String>,
}
