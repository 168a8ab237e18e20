//! Block persistence
//!
//! `BlockStore` is the append-only store the chain writes through. Two
//! implementations ship with the node: `MemoryStore` for tests and throwaway
//! nodes, and `SledStore` for on-disk chains.
//!
//! Blocks are addressed by index (the genesis block sits at `GENESIS_INDEX`)
//! and by hash. Streams are snapshots: they capture the chain length when
//! created and never see blocks appended afterwards.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::core::block::{Block, BlockObject, GENESIS_INDEX};
use crate::error::{BlockchainError, Result, StorageViolation};

pub trait BlockStore: Send + Sync {
    /// Number of stored blocks
    fn len(&self) -> Result<usize>;

    fn get_by_index(&self, index: u64) -> Result<Option<Block>>;

    fn get_by_hash(&self, hash: &[u8]) -> Result<Option<Block>>;

    fn get_last_block(&self) -> Result<Option<Block>>;

    /// The genesis block this store was configured with. It is only written
    /// when the chain is initialised.
    fn get_genesis_block(&self) -> &Block;

    /// Appends `block`. Rejects an empty hash, a hash already stored, and an
    /// index that does not directly follow the last stored block.
    fn add(&self, block: Block) -> Result<Block>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn stream_all_blocks(
        &self,
        forwards: bool,
        starting_at: Option<u64>,
    ) -> Result<BlockStream<'_, Self>> {
        BlockStream::new(self, forwards, starting_at)
    }

    fn stream_all_block_objects(
        &self,
        forwards: bool,
        starting_at: Option<u64>,
    ) -> Result<ObjectStream<'_, Self>> {
        Ok(ObjectStream {
            blocks: self.stream_all_blocks(forwards, starting_at)?,
            forwards,
            pending: Vec::new(),
        })
    }
}

/// Index the next appended block must carry, given the current last block
pub(crate) fn expected_next_index(last: Option<&Block>) -> u64 {
    last.map_or(GENESIS_INDEX, |b| b.get_index() + 1)
}

/// The checks every store runs before an append
pub(crate) fn check_append(
    block: &Block,
    last: Option<&Block>,
    hash_known: bool,
) -> Result<()> {
    if block.get_hash().is_empty() {
        return Err(StorageViolation::EmptyHash.into());
    }
    if hash_known {
        return Err(StorageViolation::DuplicateHash(block.get_hash_hex()).into());
    }
    let expected = expected_next_index(last);
    if block.get_index() != expected {
        return Err(StorageViolation::NonMonotonicIndex {
            expected,
            actual: block.get_index(),
        }
        .into());
    }
    Ok(())
}

/// Lazily reads the blocks that existed when the stream was created
pub struct BlockStream<'a, S: BlockStore + ?Sized> {
    store: &'a S,
    next: Option<u64>,
    first: u64,
    last: u64,
    forwards: bool,
}

impl<'a, S: BlockStore + ?Sized> BlockStream<'a, S> {
    fn new(store: &'a S, forwards: bool, starting_at: Option<u64>) -> Result<Self> {
        let len = store.len()? as u64;
        let first = GENESIS_INDEX;
        // When empty, last < first and nothing is yielded
        let last = (GENESIS_INDEX + len).saturating_sub(1);

        let next = if len == 0 {
            None
        } else if forwards {
            let start = starting_at.unwrap_or(first).max(first);
            (start <= last).then_some(start)
        } else {
            let start = starting_at.unwrap_or(last).min(last);
            (start >= first).then_some(start)
        };

        Ok(BlockStream {
            store,
            next,
            first,
            last,
            forwards,
        })
    }
}

impl<'a, S: BlockStore + ?Sized> Iterator for BlockStream<'a, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        self.next = if self.forwards {
            (index < self.last).then_some(index + 1)
        } else {
            (index > self.first).then(|| index - 1)
        };

        match self.store.get_by_index(index) {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.next = None;
                Some(Err(BlockchainError::Database(format!(
                    "Block {index} vanished from an append-only store"
                ))))
            }
            Err(e) => {
                self.next = None;
                Some(Err(e))
            }
        }
    }
}

/// Every payload entry of a block stream, in stream order
pub struct ObjectStream<'a, S: BlockStore + ?Sized> {
    blocks: BlockStream<'a, S>,
    forwards: bool,
    // Remaining objects of the current block, stored so that pop() yields them in order
    pending: Vec<BlockObject>,
}

impl<'a, S: BlockStore + ?Sized> Iterator for ObjectStream<'a, S> {
    type Item = Result<BlockObject>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(object) = self.pending.pop() {
                return Some(Ok(object));
            }
            let block = match self.blocks.next()? {
                Ok(block) => block,
                Err(e) => return Some(Err(e)),
            };
            let mut objects = block.get_objects().to_vec();
            if self.forwards {
                objects.reverse();
            }
            self.pending = objects;
        }
    }
}
