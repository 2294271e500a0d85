//! Zilliqa ↔ Poly Relayer Library
//!
//! Relays cross-chain transfers in both directions between a Zilliqa chain and
//! the Poly relay network.
//!
//! - Zilliqa → poly: tx and ds block headers are synced to poly's header-sync
//!   contract, cross-chain events are queued in the durable store and imported
//!   on poly with zilliqa state proofs.
//! - Poly → zilliqa: `makeProof` notifications are turned into
//!   `verifyHeaderAndExecuteTx` calls on the zilliqa cross-chain manager,
//!   submitted by a pool of signers whose nonces are tracked and unstuck in
//!   the background.
//!
//! Chain RPC, keystore decryption and transaction signing sit behind the
//! traits in [`chain`] and [`credentials`].

pub mod chain;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod monitor;
pub mod sender;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use config::{Config, DispatchStrategy, TargetContract};
pub use credentials::{CredentialStore, KeystoreCredentials, KeystoreDecryptor, SigningAccount};
pub use error::{RelayerError, SubmitErrorKind};
pub use monitor::{PolySyncManager, ZilliqaSyncManager};
pub use sender::{NonceManager, SenderPool, ZilSender};
pub use service::{ChainAdapters, RelayerService};
pub use storage::{RelayerStore, StoreError};
