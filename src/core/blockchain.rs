// The chain orchestrator: validates candidate blocks and chains and appends
// accepted blocks through the store.
// Writers (add_block, replace_chain, init) hold `writer` across
// "read head -> validate -> append" so two appends never race on the same head.

use crate::core::block::{Block, BlockObject};
use crate::core::proof_of_work::{work_measure, Miner, ProofOfWork};
use crate::error::{BlockValidationError, BlockchainError, ChainValidationError, Result};
use crate::storage::{BlockStream, BlockStore, ObjectStream};
use crate::utils::{constant_time_equals, current_timestamp, to_hex};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Uninitialized,
    /// Genesis is in the store, nothing appended by this instance yet
    Initialized,
    Operating,
}

pub struct Blockchain<S: BlockStore, P: ProofOfWork> {
    store: S,
    pow: Arc<P>,
    state: RwLock<ChainState>,
    writer: Mutex<()>,
}

impl<S: BlockStore, P: ProofOfWork + 'static> Blockchain<S, P> {
    pub fn new(store: S, pow: P) -> Blockchain<S, P> {
        Blockchain {
            store,
            pow: Arc::new(pow),
            state: RwLock::new(ChainState::Uninitialized),
            writer: Mutex::new(()),
        }
    }

    /// Writes the configured genesis block into an empty store. Safe to call
    /// more than once.
    pub fn init(&self) -> Result<()> {
        let _writer = self.lock_writer()?;
        if self.store.is_empty()? {
            let genesis = self.store.get_genesis_block().clone();
            info!("Creating genesis block {}", genesis.get_hash_hex());
            self.store.add(genesis)?;
        }
        if self.get_state()? == ChainState::Uninitialized {
            self.set_state(ChainState::Initialized)?;
        }
        Ok(())
    }

    /// Validates `candidate` against the current head and appends it
    pub fn add_block(&self, candidate: Block) -> Result<Block> {
        self.ensure_initialized()?;
        let _writer = self.lock_writer()?;
        let head = self.head()?;
        self.check_block(&candidate, &head)?;

        let block = self.store.add(candidate)?;
        self.set_state(ChainState::Operating)?;
        info!(
            "Added block {} ({})",
            block.get_index(),
            block.get_hash_hex()
        );
        Ok(block)
    }

    /// Checks `candidate` as the direct successor of `previous`. The checks run
    /// in a fixed order and the first failure is reported.
    pub fn check_block(&self, candidate: &Block, previous: &Block) -> Result<()> {
        self.ensure_initialized()?;
        self.validate_pair(candidate, previous)
            .map_err(BlockchainError::from)
    }

    fn validate_pair(
        &self,
        candidate: &Block,
        previous: &Block,
    ) -> std::result::Result<(), BlockValidationError> {
        let expected_index = previous.get_index() + 1;
        if candidate.get_index() != expected_index {
            return Err(BlockValidationError::IndexMismatch {
                expected: expected_index,
                actual: candidate.get_index(),
            });
        }

        if !constant_time_equals(candidate.get_previous_hash(), previous.get_hash()) {
            return Err(BlockValidationError::PreviousHashMismatch {
                expected: previous.get_hash_hex(),
                actual: to_hex(candidate.get_previous_hash()),
            });
        }

        let recomputed = candidate.compute_hash();
        if !constant_time_equals(&recomputed, candidate.get_hash()) {
            return Err(BlockValidationError::HashMismatch {
                expected: to_hex(&recomputed),
                actual: candidate.get_hash_hex(),
            });
        }
        for (position, object) in candidate.get_objects().iter().enumerate() {
            let recomputed = object.compute_hash();
            if !constant_time_equals(&recomputed, object.get_hash()) {
                return Err(BlockValidationError::ObjectHashMismatch {
                    position,
                    expected: to_hex(&recomputed),
                    actual: to_hex(object.get_hash()),
                });
            }
        }

        let measure = work_measure(candidate);
        let threshold = self.pow.difficulty(candidate.get_index());
        if measure >= threshold {
            return Err(BlockValidationError::InsufficientWork {
                index: candidate.get_index(),
                measure: format!("{measure:x}"),
                threshold: format!("{threshold:x}"),
            });
        }
        Ok(())
    }

    /// Validates a whole chain from its genesis block on
    pub fn check_chain(&self, chain: &[Block]) -> Result<()> {
        self.ensure_initialized()?;
        let Some(candidate_genesis) = chain.first() else {
            return Err(ChainValidationError::EmptyChain.into());
        };

        let genesis = self.store.get_genesis_block();
        if !constant_time_equals(candidate_genesis.get_hash(), genesis.get_hash())
            || !constant_time_equals(&candidate_genesis.compute_hash(), genesis.get_hash())
        {
            return Err(ChainValidationError::GenesisMismatch {
                expected: genesis.get_hash_hex(),
                actual: candidate_genesis.get_hash_hex(),
            }
            .into());
        }

        for (index, pair) in chain.windows(2).enumerate() {
            self.validate_pair(&pair[1], &pair[0]).map_err(|cause| {
                ChainValidationError::InvalidPair {
                    index: index + 1,
                    cause,
                }
            })?;
        }
        Ok(())
    }

    /// Longest-chain rule: takes `chain` only if it is strictly longer than
    /// the local chain and valid, then appends the blocks past the local
    /// length. Returns how many blocks were appended.
    pub fn replace_chain(&self, chain: &[Block]) -> Result<usize> {
        self.ensure_initialized()?;
        let _writer = self.lock_writer()?;
        let local = self.store.len()?;
        if chain.len() <= local {
            return Err(ChainValidationError::ChainNotLonger {
                local,
                candidate: chain.len(),
            }
            .into());
        }
        self.check_chain(chain)?;

        // The suffix has to hang off our own head, otherwise the candidate is
        // a fork of the local chain and appending it would break the links.
        let mut head = self.head()?;
        for (offset, block) in chain[local..].iter().enumerate() {
            self.validate_pair(block, &head).map_err(|cause| {
                warn!("Candidate chain diverges from the local chain at {}", local + offset);
                ChainValidationError::InvalidPair {
                    index: local + offset,
                    cause,
                }
            })?;
            head = self.store.add(block.clone())?;
        }

        self.set_state(ChainState::Operating)?;
        let appended = chain.len() - local;
        info!(
            "Replaced chain: appended {appended} blocks, new head {}",
            head.get_hash_hex()
        );
        Ok(appended)
    }

    /// Builds the next block on the current head
    pub fn next_block(&self, objects: Vec<BlockObject>) -> Result<Block> {
        self.ensure_initialized()?;
        let head = self.head()?;
        Ok(Block::new(
            head.get_index() + 1,
            head.get_hash().to_vec(),
            current_timestamp()?,
            objects,
        ))
    }

    /// Builds the next block, proves it on a miner thread and appends it
    pub fn mine_block(&self, objects: Vec<BlockObject>) -> Result<Block> {
        let candidate = self.next_block(objects)?;
        info!(
            "Mining block {} with {} objects",
            candidate.get_index(),
            candidate.get_objects().len()
        );
        let miner = Miner::spawn(Arc::clone(&self.pow), candidate)?;
        let block = miner.join()?;
        self.add_block(block)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    pub fn last_block(&self) -> Result<Block> {
        self.ensure_initialized()?;
        self.head()
    }

    pub fn genesis_block(&self) -> &Block {
        self.store.get_genesis_block()
    }

    pub fn block_by_index(&self, index: u64) -> Result<Option<Block>> {
        self.ensure_initialized()?;
        self.store.get_by_index(index)
    }

    pub fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        self.ensure_initialized()?;
        self.store.get_by_hash(hash)
    }

    /// Snapshot of the chain, oldest block first
    pub fn blocks(&self) -> Result<BlockStream<'_, S>> {
        self.ensure_initialized()?;
        self.store.stream_all_blocks(true, None)
    }

    /// Snapshot of every payload entry, oldest first
    pub fn objects(&self) -> Result<ObjectStream<'_, S>> {
        self.ensure_initialized()?;
        self.store.stream_all_block_objects(true, None)
    }

    pub fn get_state(&self) -> Result<ChainState> {
        self.state
            .read()
            .map(|state| *state)
            .map_err(|_| BlockchainError::Database("Chain state lock poisoned".to_string()))
    }

    pub fn get_store(&self) -> &S {
        &self.store
    }

    pub fn get_proof_of_work(&self) -> &P {
        &self.pow
    }

    fn set_state(&self, next: ChainState) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BlockchainError::Database("Chain state lock poisoned".to_string()))?;
        *state = next;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        match self.get_state()? {
            ChainState::Uninitialized => Err(BlockchainError::NotInitialized),
            _ => Ok(()),
        }
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| BlockchainError::Database("Chain writer lock poisoned".to_string()))
    }

    fn head(&self) -> Result<Block> {
        self.store.get_last_block()?.ok_or_else(|| {
            BlockchainError::Database("Initialised chain has no blocks".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::{Note, Payload};
    use crate::core::proof_of_work::{DifficultySchedule, NullProofOfWork, ScheduledProofOfWork};
    use crate::error::StorageViolation;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use std::thread;

    fn null_chain() -> Blockchain<MemoryStore, NullProofOfWork> {
        let chain = Blockchain::new(MemoryStore::new(Block::genesis(0)), NullProofOfWork);
        chain.init().unwrap();
        chain
    }

    fn note(title: &str) -> BlockObject {
        BlockObject::new("tests", 1, 0, Payload::from(Note::new(title)))
    }

    fn successor(previous: &Block, title: &str) -> Block {
        Block::new(
            previous.get_index() + 1,
            previous.get_hash().to_vec(),
            previous.get_timestamp() + 1,
            vec![note(title)],
        )
    }

    #[test]
    fn test_calls_before_init_fail() {
        let chain = Blockchain::new(MemoryStore::new(Block::genesis(0)), NullProofOfWork);
        assert_eq!(chain.get_state().unwrap(), ChainState::Uninitialized);
        let genesis = Block::genesis(0);
        assert_eq!(
            chain.add_block(successor(&genesis, "a")),
            Err(BlockchainError::NotInitialized)
        );
        assert_eq!(chain.last_block(), Err(BlockchainError::NotInitialized));
        assert_eq!(chain.replace_chain(&[]), Err(BlockchainError::NotInitialized));
    }

    #[test]
    fn test_init_is_idempotent() {
        let chain = null_chain();
        chain.init().unwrap();
        assert_eq!(chain.len().unwrap(), 1);
        assert_eq!(chain.get_state().unwrap(), ChainState::Initialized);
        assert_eq!(&chain.last_block().unwrap(), chain.genesis_block());
    }

    #[test]
    fn test_add_block_moves_to_operating() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let block = chain.add_block(successor(&genesis, "a")).unwrap();
        assert_eq!(block.get_index(), 2);
        assert_eq!(chain.get_state().unwrap(), ChainState::Operating);
        assert_eq!(chain.last_block().unwrap(), block);
    }

    #[test]
    fn test_check_block_index_too_low_and_too_high() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        for index in [1, 3] {
            let candidate = Block::new(index, genesis.get_hash().to_vec(), 1, vec![]);
            assert_eq!(
                chain.check_block(&candidate, &genesis),
                Err(BlockchainError::BlockValidation(
                    BlockValidationError::IndexMismatch {
                        expected: 2,
                        actual: index
                    }
                ))
            );
        }
    }

    #[test]
    fn test_check_block_previous_hash_tamper() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let candidate = Block::new(2, vec![9; 32], 1, vec![]);
        assert!(matches!(
            chain.check_block(&candidate, &genesis),
            Err(BlockchainError::BlockValidation(
                BlockValidationError::PreviousHashMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_check_block_hash_tamper() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let good = successor(&genesis, "a");
        let tampered = Block::from_parts(
            good.get_index(),
            good.get_previous_hash().to_vec(),
            good.get_timestamp() + 1,
            good.get_nonce(),
            good.get_hash().to_vec(),
            Some(good.get_objects().to_vec()),
        );
        assert!(matches!(
            chain.check_block(&tampered, &genesis),
            Err(BlockchainError::BlockValidation(
                BlockValidationError::HashMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_check_block_insufficient_work() {
        let schedule = DifficultySchedule::constant(16).unwrap();
        let chain = Blockchain::new(
            MemoryStore::new(Block::genesis(0)),
            ScheduledProofOfWork::new(schedule),
        );
        chain.init().unwrap();
        let genesis = chain.last_block().unwrap();

        // Find a nonce whose hash is clearly above the 16-bit threshold
        let unworked = (0..)
            .map(|nonce| successor(&genesis, "a").with_nonce(nonce))
            .find(|b| b.get_hash()[0] != 0)
            .unwrap();
        assert!(matches!(
            chain.check_block(&unworked, &genesis),
            Err(BlockchainError::BlockValidation(
                BlockValidationError::InsufficientWork { index: 2, .. }
            ))
        ));
    }

    #[test]
    fn test_mine_block_with_schedule() {
        let schedule = DifficultySchedule::constant(6).unwrap();
        let chain = Blockchain::new(
            MemoryStore::new(Block::genesis(0)),
            ScheduledProofOfWork::new(schedule),
        );
        chain.init().unwrap();
        let block = chain.mine_block(vec![note("mined")]).unwrap();
        assert_eq!(block.get_index(), 2);
        assert!(chain.get_proof_of_work().is_satisfied(&block));
        assert_eq!(chain.objects().unwrap().count(), 1);
    }

    #[test]
    fn test_store_violation_surfaces() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let block = successor(&genesis, "a");
        chain.add_block(block.clone()).unwrap();
        // Same block again fails index validation before reaching the store
        assert!(chain.add_block(block).is_err());

        let empty = Block::from_parts(3, vec![], 0, 0, vec![], None);
        assert!(chain.get_store().add(empty).is_err_and(|e| e
            == BlockchainError::Storage(StorageViolation::EmptyHash)));
    }

    #[test]
    fn test_check_chain_genesis_mismatch() {
        let chain = null_chain();
        let other_genesis = Block::genesis(1);
        assert!(matches!(
            chain.check_chain(&[other_genesis]),
            Err(BlockchainError::ChainValidation(
                ChainValidationError::GenesisMismatch { .. }
            ))
        ));
        assert_eq!(
            chain.check_chain(&[]),
            Err(BlockchainError::ChainValidation(ChainValidationError::EmptyChain))
        );
    }

    #[test]
    fn test_replace_chain_rejects_equal_and_shorter() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let b2 = chain.add_block(successor(&genesis, "a")).unwrap();

        let equal = vec![genesis.clone(), successor(&genesis, "other")];
        assert_eq!(
            chain.replace_chain(&equal),
            Err(BlockchainError::ChainValidation(
                ChainValidationError::ChainNotLonger {
                    local: 2,
                    candidate: 2
                }
            ))
        );
        assert!(chain.replace_chain(&[genesis]).is_err());
        assert_eq!(chain.last_block().unwrap(), b2);
    }

    #[test]
    fn test_replace_chain_appends_suffix() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let b2 = successor(&genesis, "a");
        let b3 = successor(&b2, "b");
        let b4 = successor(&b3, "c");
        chain.add_block(b2.clone()).unwrap();

        let appended = chain
            .replace_chain(&[genesis, b2, b3, b4.clone()])
            .unwrap();
        assert_eq!(appended, 2);
        assert_eq!(chain.len().unwrap(), 4);
        assert_eq!(chain.last_block().unwrap(), b4);
    }

    #[test]
    fn test_replace_chain_refuses_fork() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        chain.add_block(successor(&genesis, "mine")).unwrap();

        let theirs = successor(&genesis, "theirs");
        let next = successor(&theirs, "next");
        let result = chain.replace_chain(&[genesis, theirs, next]);
        assert!(matches!(
            result,
            Err(BlockchainError::ChainValidation(
                ChainValidationError::InvalidPair { index: 2, .. }
            ))
        ));
        assert_eq!(chain.len().unwrap(), 2);
    }

    #[test]
    fn test_forged_object_hash_rejected() {
        let chain = null_chain();
        let genesis = chain.last_block().unwrap();
        let honest = note("payload");
        let forged = BlockObject::from_parts(
            honest.get_source_id().to_string(),
            honest.get_version(),
            honest.get_timestamp(),
            vec![0xab; 32],
            honest.get_data().clone(),
        );
        // The block hash only covers content, so it still recomputes cleanly
        let candidate = Block::new(2, genesis.get_hash().to_vec(), 1, vec![honest, forged]);
        assert_eq!(candidate.compute_hash().to_vec(), candidate.get_hash().to_vec());

        match chain.add_block(candidate) {
            Err(BlockchainError::BlockValidation(BlockValidationError::ObjectHashMismatch {
                position,
                actual,
                ..
            })) => {
                assert_eq!(position, 1);
                assert_eq!(actual, "ab".repeat(32));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(chain.len().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_appends_claim_one_index() {
        let chain = Arc::new(null_chain());
        let genesis = chain.last_block().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let chain = Arc::clone(&chain);
                let candidate = successor(&genesis, &format!("racer {i}"));
                thread::spawn(move || chain.add_block(candidate))
            })
            .collect();
        let results: Vec<Result<Block>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(BlockchainError::BlockValidation(
                    BlockValidationError::IndexMismatch { expected: 3, actual: 2 }
                ))
            ));
        }
        assert_eq!(chain.len().unwrap(), 2);
    }
}
