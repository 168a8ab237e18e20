use crate::core::block::Block;
use crate::error::{BlockchainError, Result};
use log::{debug, info};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pluggable gate on block acceptance.
///
/// A block satisfies the strategy when `work_measure(block) < difficulty(index)`;
/// a lower measure means more work. Verification needs nothing but the block.
pub trait ProofOfWork: Send + Sync {
    /// Threshold the measure of a block at `index` has to stay below
    fn difficulty(&self, index: u64) -> BigUint;

    /// Returns a copy of `block` whose measure is below `threshold`
    fn prove_work(&self, block: Block, threshold: &BigUint) -> Result<Block>;

    fn is_satisfied(&self, block: &Block) -> bool {
        work_measure(block) < self.difficulty(block.get_index())
    }
}

/// The block hash read as a big-endian unsigned integer
pub fn work_measure(block: &Block) -> BigUint {
    BigUint::from_bytes_be(block.get_hash())
}

/// `2^(256 - bits)`, the threshold for `bits` leading zero bits
pub fn threshold_for_bits(bits: u32) -> BigUint {
    BigUint::from(1u8) << (256 - bits.min(256)) as usize
}

/// Accepts every block. Used by ledgers gated by ownership instead of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProofOfWork;

impl ProofOfWork for NullProofOfWork {
    fn difficulty(&self, _index: u64) -> BigUint {
        threshold_for_bits(0)
    }

    fn prove_work(&self, block: Block, _threshold: &BigUint) -> Result<Block> {
        Ok(block)
    }
}

/// One step of a difficulty schedule: from `from_index` on, require `bits`
/// leading zero bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyStep {
    pub from_index: u64,
    pub bits: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifficultySchedule {
    steps: Vec<DifficultyStep>,
}

impl DifficultySchedule {
    pub fn new(mut steps: Vec<DifficultyStep>) -> Result<DifficultySchedule> {
        steps.sort_by_key(|s| s.from_index);
        if let Some(step) = steps.iter().find(|s| s.bits > 256) {
            return Err(BlockchainError::Config(format!(
                "Difficulty step at index {} asks for {} bits, at most 256 allowed",
                step.from_index, step.bits
            )));
        }
        if steps.windows(2).any(|w| w[0].from_index == w[1].from_index) {
            return Err(BlockchainError::Config(
                "Difficulty schedule has two steps for the same index".to_string(),
            ));
        }
        Ok(DifficultySchedule { steps })
    }

    /// Constant difficulty from the genesis block on
    pub fn constant(bits: u32) -> Result<DifficultySchedule> {
        DifficultySchedule::new(vec![DifficultyStep { from_index: 0, bits }])
    }

    /// Leading zero bits required at `index`; zero before the first step
    pub fn bits_at(&self, index: u64) -> u32 {
        self.steps
            .iter()
            .rev()
            .find(|s| s.from_index <= index)
            .map(|s| s.bits)
            .unwrap_or(0)
    }

    pub fn get_steps(&self) -> &[DifficultyStep] {
        self.steps.as_slice()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduledProofOfWork {
    schedule: DifficultySchedule,
}

impl ScheduledProofOfWork {
    pub fn new(schedule: DifficultySchedule) -> ScheduledProofOfWork {
        ScheduledProofOfWork { schedule }
    }

    pub fn get_schedule(&self) -> &DifficultySchedule {
        &self.schedule
    }
}

impl ProofOfWork for ScheduledProofOfWork {
    fn difficulty(&self, index: u64) -> BigUint {
        threshold_for_bits(self.schedule.bits_at(index))
    }

    fn prove_work(&self, block: Block, threshold: &BigUint) -> Result<Block> {
        let index = block.get_index();
        debug!("Mining block {index}");
        let mut candidate = block;
        let mut nonce = 0u64;
        loop {
            candidate = candidate.with_nonce(nonce);
            if &work_measure(&candidate) < threshold {
                info!(
                    "Mined block {index} with nonce {nonce}: {}",
                    candidate.get_hash_hex()
                );
                return Ok(candidate);
            }
            nonce = nonce.checked_add(1).ok_or_else(|| {
                BlockchainError::Mining(format!("Nonce space exhausted for block {index}"))
            })?;
        }
    }
}

impl<P: ProofOfWork + ?Sized> ProofOfWork for Arc<P> {
    fn difficulty(&self, index: u64) -> BigUint {
        (**self).difficulty(index)
    }

    fn prove_work(&self, block: Block, threshold: &BigUint) -> Result<Block> {
        (**self).prove_work(block, threshold)
    }
}

impl<P: ProofOfWork + ?Sized> ProofOfWork for Box<P> {
    fn difficulty(&self, index: u64) -> BigUint {
        (**self).difficulty(index)
    }

    fn prove_work(&self, block: Block, threshold: &BigUint) -> Result<Block> {
        (**self).prove_work(block, threshold)
    }
}

/// Nonce search running on its own worker thread
pub struct Miner {
    handle: JoinHandle<Result<Block>>,
}

impl Miner {
    pub fn spawn<P>(pow: P, block: Block) -> Result<Miner>
    where
        P: ProofOfWork + 'static,
    {
        let name = format!("miner-{}", block.get_index());
        let handle = thread::Builder::new().name(name).spawn(move || {
            let threshold = pow.difficulty(block.get_index());
            pow.prove_work(block, &threshold)
        })?;
        Ok(Miner { handle })
    }

    /// Blocks until the worker is done
    pub fn join(self) -> Result<Block> {
        self.handle
            .join()
            .map_err(|_| BlockchainError::Mining("Miner thread panicked".to_string()))?
    }
}
