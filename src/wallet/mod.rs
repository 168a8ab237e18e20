//! Wallets and key derivation
//!
//! A wallet turns a passphrase into a secret (`kdf`), and the secret into an
//! ordered chain of Ed25519 key pairs (`keychain`). Wallet metadata is kept in
//! a wallet file (`wallets`); secrets and private keys never are.

pub mod kdf;
pub mod keychain;
#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use kdf::{derive_secret, spawn_derive_secret, KdfParams, Secret, SecretDerivation};
pub use keychain::{verify_signature, KeyChain, KeyPair, DERIVATION_SALT};
pub use wallet::{password_hash, DerivationMode, Wallet};
pub use wallets::{WalletFactory, WalletRecord, Wallets, FIXED_SALT, WALLET_FILE};
