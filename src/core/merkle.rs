use crate::core::block::BlockObject;
use crate::core::hashing::{compute_hash_bytes, EmptyMarker};
use crate::error::{BlockchainError, Result};
use crate::utils::{double_sha256, Hash};

/// Merkle root over a block's payload entries.
///
/// An empty list hashes to the `EmptyMarker` sentinel. Otherwise every leaf is
/// the double hash of the object's content digest and pairs are reduced with
/// double SHA-256, duplicating the last entry of any odd level.
pub fn compute_merkle_root(objects: &[BlockObject]) -> Hash {
    if objects.is_empty() {
        return compute_hash_bytes(&EmptyMarker);
    }
    MerkleTree::new(objects).root()
}

/// Merkle tree keeping every level, for root computation and inclusion proofs
#[derive(Debug, Clone)]
pub struct MerkleTree {
    // levels[0] are the leaves padded to even length, the last level holds
    // the single root
    levels: Vec<Vec<Hash>>,
    leaf_count: usize,
}

/// Proof that one leaf belongs under a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub leaf_index: usize,
    pub path: Vec<ProofElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofElement {
    /// Sibling hash
    pub hash: Hash,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    /// Builds the tree for a non-empty object list.
    pub fn new(objects: &[BlockObject]) -> Self {
        let leaves = objects.iter().map(leaf_hash).collect();
        Self::from_leaves(leaves)
    }

    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        let leaf_count = leaves.len();
        let mut levels = Vec::new();
        let mut current = leaves;

        // The leaf level is padded on any odd count, a single leaf included;
        // inner levels only while they hold more than one entry.
        if current.is_empty() {
            current.push(compute_hash_bytes(&EmptyMarker));
        } else {
            pad_odd(&mut current);
        }

        loop {
            let done = current.len() == 1;
            levels.push(current.clone());
            if done {
                break;
            }
            current = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            if current.len() > 1 {
                pad_odd(&mut current);
            }
        }

        MerkleTree { levels, leaf_count }
    }

    pub fn root(&self) -> Hash {
        // from_leaves always pushes at least one level ending in a single hash
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(|| compute_hash_bytes(&EmptyMarker))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Inclusion proof for the leaf at `leaf_index`
    pub fn proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count {
            return Err(BlockchainError::Serialization(format!(
                "Leaf index {leaf_index} out of bounds ({} leaves)",
                self.leaf_count
            )));
        }

        let mut path = Vec::new();
        let mut position = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            path.push(ProofElement {
                hash: level[sibling],
                is_right: sibling > position,
            });
            position /= 2;
        }

        Ok(MerkleProof {
            leaf: self.levels[0][leaf_index],
            leaf_index,
            path,
        })
    }
}

impl MerkleProof {
    pub fn verify(&self, root: &Hash) -> bool {
        let mut current = self.leaf;
        for element in &self.path {
            current = if element.is_right {
                hash_pair(&current, &element.hash)
            } else {
                hash_pair(&element.hash, &current)
            };
        }
        &current == root
    }
}

/// Leaf digest of one payload entry
pub fn leaf_hash(object: &BlockObject) -> Hash {
    double_sha256(&compute_hash_bytes(object))
}

fn pad_odd(level: &mut Vec<Hash>) {
    if level.len() % 2 == 1 {
        if let Some(&last) = level.last() {
            level.push(last);
        }
    }
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    double_sha256(&combined)
}
