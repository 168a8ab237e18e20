//! # Architect Ledger
//!
//! A ledger of blocks carrying typed objects (transactions, notes), secured
//! by a pluggable proof-of-work strategy and synced between nodes over TCP.
//!
//! ## Layout
//! - `core/`: blocks, canonical hashing, Merkle roots, the binary codec,
//!   proof of work and the `Blockchain` orchestrator
//! - `storage/`: the `BlockStore` trait with memory and sled backends
//! - `network/`: JSON-over-TCP peer protocol and chain reconciliation
//! - `wallet/`: passphrase KDF, deterministic Ed25519 key chains and the
//!   wallet file
//! - `config/`: TOML configuration with environment overrides
//! - `cli/`: command-line arguments of the `architect-ledger` binary
//!
//! A chain is built from a store and a strategy, then initialised:
//!
//! ```no_run
//! use architect_ledger::{Block, Blockchain, MemoryStore, NullProofOfWork};
//!
//! let chain = Blockchain::new(MemoryStore::new(Block::genesis(0)), NullProofOfWork);
//! chain.init()?;
//! let block = chain.mine_block(vec![])?;
//! assert_eq!(block.get_index(), 2);
//! # Ok::<(), architect_ledger::BlockchainError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, BlockCodec, BlockObject, Blockchain, ChainState, HashBuilder, Note, NullProofOfWork,
    Payload, ProofOfWork, ScheduledProofOfWork, Transaction,
};
pub use error::{BlockchainError, Result};
pub use network::{Nodes, PeerClient, PeerSync, Server, SyncOutcome};
pub use storage::{BlockStore, MemoryStore, SledStore};
pub use wallet::{KeyChain, KeyPair, Wallet, WalletFactory, Wallets};
