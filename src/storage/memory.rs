use crate::core::block::{Block, GENESIS_INDEX};
use crate::error::{BlockchainError, Result};
use crate::storage::{check_append, BlockStore};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

#[derive(Default)]
struct Inner {
    blocks: Vec<Block>,
    by_hash: HashMap<Vec<u8>, usize>,
}

/// In-memory block store. Nothing survives the process.
pub struct MemoryStore {
    genesis: Block,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(genesis: Block) -> MemoryStore {
        MemoryStore {
            genesis,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| BlockchainError::Database("Memory store lock poisoned".to_string()))
    }
}

impl BlockStore for MemoryStore {
    fn len(&self) -> Result<usize> {
        Ok(self.read()?.blocks.len())
    }

    fn get_by_index(&self, index: u64) -> Result<Option<Block>> {
        let Some(position) = index.checked_sub(GENESIS_INDEX) else {
            return Ok(None);
        };
        Ok(self.read()?.blocks.get(position as usize).cloned())
    }

    fn get_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner
            .by_hash
            .get(hash)
            .and_then(|&position| inner.blocks.get(position))
            .cloned())
    }

    fn get_last_block(&self) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.last().cloned())
    }

    fn get_genesis_block(&self) -> &Block {
        &self.genesis
    }

    fn add(&self, block: Block) -> Result<Block> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| BlockchainError::Database("Memory store lock poisoned".to_string()))?;
        check_append(
            &block,
            inner.blocks.last(),
            inner.by_hash.contains_key(block.get_hash()),
        )?;

        let position = inner.blocks.len();
        inner.by_hash.insert(block.get_hash().to_vec(), position);
        inner.blocks.push(block.clone());
        Ok(block)
    }
}
