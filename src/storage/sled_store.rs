// On-disk block store backed by sled.
// Tree `blocks` maps the big-endian block index to the block's codec record,
// tree `hash_index` maps the block hash to the same big-endian index.

use crate::core::block::Block;
use crate::core::codec::BlockCodec;
use crate::error::{BlockchainError, Result};
use crate::storage::{check_append, BlockStore};
use log::{debug, info};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const BLOCKS_TREE: &str = "blocks";
const HASH_INDEX_TREE: &str = "hash_index";

pub struct SledStore {
    genesis: Block,
    db: Db,
    blocks: Tree,
    hash_index: Tree,
    db_path: PathBuf,
    // Appends are check-then-write; this keeps them from interleaving
    append_lock: Mutex<()>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P, genesis: Block) -> Result<SledStore> {
        let db_path = path.as_ref().to_path_buf();
        let db = sled::open(&db_path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let hash_index = db.open_tree(HASH_INDEX_TREE).map_err(|e| {
            BlockchainError::Database(format!("Failed to open hash index tree: {e}"))
        })?;

        info!(
            "Opened block store at {} ({} blocks)",
            db_path.display(),
            blocks.len()
        );
        Ok(SledStore {
            genesis,
            db,
            blocks,
            hash_index,
            db_path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Waits until every write so far is on disk
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Block> {
        BlockCodec::default().deserialize_block(bytes)
    }

    fn index_from_key(bytes: &[u8]) -> Result<u64> {
        let key: [u8; 8] = bytes.try_into().map_err(|_| {
            BlockchainError::Database(format!("Malformed index key of {} bytes", bytes.len()))
        })?;
        Ok(u64::from_be_bytes(key))
    }
}

impl BlockStore for SledStore {
    fn len(&self) -> Result<usize> {
        Ok(self.blocks.len())
    }

    fn get_by_index(&self, index: u64) -> Result<Option<Block>> {
        self.blocks
            .get(index.to_be_bytes())
            .map_err(|e| BlockchainError::Database(format!("Failed to read block {index}: {e}")))?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn get_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        let Some(key) = self
            .hash_index
            .get(hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to read hash index: {e}")))?
        else {
            return Ok(None);
        };
        self.get_by_index(Self::index_from_key(&key)?)
    }

    fn get_last_block(&self) -> Result<Option<Block>> {
        self.blocks
            .last()
            .map_err(|e| BlockchainError::Database(format!("Failed to read last block: {e}")))?
            .map(|(_, bytes)| Self::decode(&bytes))
            .transpose()
    }

    fn get_genesis_block(&self) -> &Block {
        &self.genesis
    }

    fn add(&self, block: Block) -> Result<Block> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| BlockchainError::Database("Append lock poisoned".to_string()))?;

        let last = self.get_last_block()?;
        let hash_known = self
            .hash_index
            .contains_key(block.get_hash())
            .map_err(|e| BlockchainError::Database(format!("Failed to read hash index: {e}")))?;
        check_append(&block, last.as_ref(), hash_known)?;

        let key = block.get_index().to_be_bytes();
        let record = BlockCodec::default().serialize_block(&block)?;
        (&self.blocks, &self.hash_index)
            .transaction(|(blocks, hash_index)| {
                blocks.insert(&key[..], record.as_slice())?;
                hash_index.insert(block.get_hash(), &key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| {
                BlockchainError::Database(format!("Failed to append block: {e:?}"))
            })?;

        debug!("Stored block {} ({})", block.get_index(), block.get_hash_hex());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockObject;
    use crate::core::payload::{Note, Payload};
    use tempfile::TempDir;

    #[test]
    fn test_blocks_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let genesis = Block::genesis(0);
        let second = Block::new(
            2,
            genesis.get_hash().to_vec(),
            5,
            vec![BlockObject::new("s", 1, 5, Payload::from(Note::new("kept")))],
        );

        {
            let store = SledStore::open(temp_dir.path(), genesis.clone()).unwrap();
            store.add(genesis.clone()).unwrap();
            store.add(second.clone()).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(temp_dir.path(), genesis.clone()).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get_by_index(1).unwrap(), Some(genesis));
        assert_eq!(store.get_by_hash(second.get_hash()).unwrap(), Some(second.clone()));
        assert_eq!(store.get_last_block().unwrap(), Some(second));
    }

    #[test]
    fn test_index_keys_sort_numerically() {
        let temp_dir = TempDir::new().unwrap();
        let genesis = Block::genesis(0);
        let store = SledStore::open(temp_dir.path(), genesis.clone()).unwrap();
        let mut prev = store.add(genesis).unwrap();
        for index in 2..=300 {
            prev = store
                .add(Block::new(index, prev.get_hash().to_vec(), 0, vec![]))
                .unwrap();
        }
        assert_eq!(store.get_last_block().unwrap().unwrap().get_index(), 300);
    }

    #[test]
    fn test_rejects_gap() {
        let temp_dir = TempDir::new().unwrap();
        let genesis = Block::genesis(0);
        let store = SledStore::open(temp_dir.path(), genesis.clone()).unwrap();
        assert!(store
            .add(Block::new(2, genesis.get_hash().to_vec(), 0, vec![]))
            .is_err());
        assert!(store.is_empty().unwrap());
    }
}
