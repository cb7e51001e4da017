//! Session coordination for on-device wallets.
//!
//! The crate sits between a UI layer and three platform collaborators: a
//! sandboxed key-management worklet, an authenticated secret vault, and a
//! plain key-value store. It owns the wallet loading state machine, the
//! single-flight operation mutex, the credential and storage-handle caches,
//! the persisted wallet data store, and the wallet service that composes
//! them into switch/unlock/create/import/delete operations.
//!
//! Nothing here touches secrets directly beyond moving opaque encrypted
//! blobs between the vault and the worklet; decrypted key material never
//! leaves the worklet boundary.

pub mod cache;
mod error;
pub use error::*;

pub mod platform;

mod state;
pub use state::*;

mod op_mutex;
pub use op_mutex::*;

mod store;
pub use store::*;

mod service;
pub use service::*;

mod types;
pub use types::*;
