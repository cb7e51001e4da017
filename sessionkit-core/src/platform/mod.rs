//! External-collaborator traits.
//!
//! The coordination layer is platform-agnostic: the cryptographic worklet,
//! the biometric-gated vault, and the durable key-value store are consumed
//! through traits. Each host (iOS, Android, desktop, tests) provides
//! implementations; every call is asynchronous and fallible, and failures
//! are never swallowed by the trait layer.
//!
//! - [`WorkletService`] — sandboxed execution environment for key
//!   derivation, session initialization, and phrase/entropy conversion.
//! - [`VaultService`] — secure credential store keyed by wallet identifier,
//!   gated by biometric authentication.
//! - [`KeyValueStore`] — durable store for non-sensitive data only
//!   (addresses, balances, roster); never secrets.

mod kv_store;
pub mod memory;
mod vault;
mod worklet;

pub use kv_store::KeyValueStore;
pub use vault::VaultService;
pub use worklet::WorkletService;

// Re-export memory implementations for testing
pub use memory::MemoryPlatform;
