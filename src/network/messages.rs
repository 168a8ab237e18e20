//! Peer request and response messages
//!
//! One JSON request and one JSON response travel over each connection. Blocks
//! are sent as hex-encoded codec records, hashes as lowercase hex.

use crate::core::block::Block;
use crate::core::codec::BlockCodec;
use crate::error::Result;
use crate::network::sync::SyncOutcome;
use crate::utils::{from_hex, to_hex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Every block, oldest first
    GetBlocks,
    GetLatestBlock,
    /// A peer announcing its head
    PutLatestBlock { addr_from: String, block: String },
    GetBlockByHash { hash: String },
    GetBlockByIndex { index: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Blocks { blocks: Vec<String> },
    Block { block: String },
    NotFound,
    Sync { outcome: SyncReport },
    Error { message: String },
}

/// Wire form of a `SyncOutcome`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncReport {
    Accepted { index: u64, hash: String },
    Ambiguous,
    Rejected,
}

impl From<&SyncOutcome> for SyncReport {
    fn from(outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Accepted(block) => SyncReport::Accepted {
                index: block.get_index(),
                hash: block.get_hash_hex(),
            },
            SyncOutcome::Ambiguous => SyncReport::Ambiguous,
            SyncOutcome::Rejected => SyncReport::Rejected,
        }
    }
}

pub fn encode_block(block: &Block) -> Result<String> {
    Ok(to_hex(&BlockCodec::default().serialize_block(block)?))
}

pub fn decode_block(hex: &str) -> Result<Block> {
    BlockCodec::default().deserialize_block(&from_hex(hex)?)
}
