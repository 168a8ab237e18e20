// One-round reconciliation with a peer that announces its latest block.
// A block that directly follows our head is validated and appended; a block
// further ahead means we are missing blocks and need the peer's whole chain;
// anything at or below our head is ignored.

use crate::core::block::Block;
use crate::core::blockchain::Blockchain;
use crate::core::proof_of_work::ProofOfWork;
use crate::error::Result;
use crate::storage::BlockStore;
use log::info;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The announced block followed our head and was appended
    Accepted(Block),
    /// The peer is more than one block ahead; fetch its chain
    Ambiguous,
    /// The peer is not ahead of us
    Rejected,
}

/// Somewhere a full chain can be fetched from
pub trait BlockSource {
    fn fetch_blocks(&self) -> Result<Vec<Block>>;

    fn describe(&self) -> String;
}

pub struct PeerSync<'a, S: BlockStore, P: ProofOfWork> {
    chain: &'a Blockchain<S, P>,
}

impl<'a, S: BlockStore, P: ProofOfWork + 'static> PeerSync<'a, S, P> {
    pub fn new(chain: &'a Blockchain<S, P>) -> Self {
        PeerSync { chain }
    }

    /// Reacts to a peer's claimed latest block. A direct successor that fails
    /// validation is reported as the validation error.
    pub fn reconcile(&self, candidate: Block) -> Result<SyncOutcome> {
        let local = self.chain.last_block()?;
        let next_index = local.get_index() + 1;

        if candidate.get_index() == next_index {
            let block = self.chain.add_block(candidate)?;
            return Ok(SyncOutcome::Accepted(block));
        }
        if candidate.get_index() > next_index {
            info!(
                "Peer is at {}, we are at {}; full chain needed",
                candidate.get_index(),
                local.get_index()
            );
            return Ok(SyncOutcome::Ambiguous);
        }
        Ok(SyncOutcome::Rejected)
    }

    /// Fetches the peer's chain and offers it to `replace_chain`.
    /// Returns the number of blocks appended.
    pub fn resolve_ambiguous<B: BlockSource + ?Sized>(&self, peer: &B) -> Result<usize> {
        let blocks = peer.fetch_blocks()?;
        info!(
            "Fetched {} blocks from {}, local chain has {}",
            blocks.len(),
            peer.describe(),
            self.chain.len()?
        );
        self.chain.replace_chain(&blocks)
    }
}
