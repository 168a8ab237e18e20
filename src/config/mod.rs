//! Node configuration
//!
//! A TOML file describes the node (address, storage, peers, proof of work,
//! genesis and wallet settings). `NODE_ADDRESS`, `NODE_ID`, `LEDGER_DATA_DIR`
//! and `LEDGER_PEERS` override the file.

pub mod settings;

pub use settings::{Config, KdfProfile, PowKind, StoreKind, GLOBAL_CONFIG};
