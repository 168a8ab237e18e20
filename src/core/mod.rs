//! Core ledger functionality
//!
//! Blocks and their payloads, content hashing, the binary record format,
//! Merkle roots, the proof-of-work strategies and the chain orchestrator.

pub mod block;
pub mod blockchain;
pub mod codec;
pub mod hashing;
pub mod merkle;
pub mod payload;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BlockObject, DEFAULT_GENESIS_TIMESTAMP, GENESIS_INDEX};
pub use blockchain::{Blockchain, ChainState};
pub use codec::{BlockCodec, PayloadRegistry, FORMAT_VERSION, MAX_FORMAT_VERSION};
pub use hashing::{compute_hash_bytes, EmptyMarker, HashBuilder, ToHashBytes};
pub use merkle::{compute_merkle_root, MerkleProof, MerkleTree, ProofElement};
pub use payload::{Note, Payload};
pub use proof_of_work::{
    work_measure, DifficultySchedule, DifficultyStep, Miner, NullProofOfWork, ProofOfWork,
    ScheduledProofOfWork,
};
pub use transaction::{ItemType, Transaction, TransactionItem, TransactionType};
