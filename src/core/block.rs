use crate::core::hashing::{compute_hash_bytes, HashBuilder, ToHashBytes};
use crate::core::merkle::compute_merkle_root;
use crate::core::payload::Payload;
use crate::utils::{to_hex, Hash};

/// Index of the genesis block every node pins.
pub const GENESIS_INDEX: u64 = 1;
/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: [u8; 1] = [0x00];
/// Default genesis timestamp (2024-01-01T00:00:00Z, millis).
pub const DEFAULT_GENESIS_TIMESTAMP: i64 = 1_704_067_200_000;

/// One payload entry inside a block. The hash is computed once on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockObject {
    source_id: String,
    version: u32,
    timestamp: i64,
    hash: Vec<u8>,
    data: Payload,
}

impl BlockObject {
    pub fn new(source_id: &str, version: u32, timestamp: i64, data: Payload) -> BlockObject {
        let mut object = BlockObject {
            source_id: source_id.to_string(),
            version,
            timestamp,
            hash: Vec::new(),
            data,
        };
        object.hash = object.compute_hash().to_vec();
        object
    }

    /// Reassembles an object read from the wire; `hash` is taken as given.
    pub fn from_parts(
        source_id: String,
        version: u32,
        timestamp: i64,
        hash: Vec<u8>,
        data: Payload,
    ) -> BlockObject {
        BlockObject {
            source_id,
            version,
            timestamp,
            hash,
            data,
        }
    }

    pub fn compute_hash(&self) -> Hash {
        compute_hash_bytes(self)
    }

    pub fn get_source_id(&self) -> &str {
        self.source_id.as_str()
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_data(&self) -> &Payload {
        &self.data
    }
}

impl ToHashBytes for BlockObject {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder
            .field_str("sourceId", &self.source_id)
            .field_u32("version", self.version)
            .field_i64("timestamp", self.timestamp)
            .field_nested("data", &self.data);
    }

    fn type_tag(&self) -> &'static str {
        "BlockObject"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    index: u64,
    previous_hash: Vec<u8>,
    timestamp: i64,
    nonce: u64,
    hash: Vec<u8>,
    objects: Vec<BlockObject>,
}

impl Block {
    /// Builds a block with nonce 0 and a freshly computed hash.
    pub fn new(
        index: u64,
        previous_hash: Vec<u8>,
        timestamp: i64,
        objects: Vec<BlockObject>,
    ) -> Block {
        let mut block = Block {
            index,
            previous_hash,
            timestamp,
            nonce: 0,
            hash: Vec::new(),
            objects,
        };
        block.hash = block.compute_hash().to_vec();
        block
    }

    /// Reassembles a block from untrusted parts. An absent object list is the
    /// same block as an empty one. The hash is not checked here; the chain does
    /// that in `check_block`.
    pub fn from_parts(
        index: u64,
        previous_hash: Vec<u8>,
        timestamp: i64,
        nonce: u64,
        hash: Vec<u8>,
        objects: Option<Vec<BlockObject>>,
    ) -> Block {
        Block {
            index,
            previous_hash,
            timestamp,
            nonce,
            hash,
            objects: objects.unwrap_or_default(),
        }
    }

    pub fn genesis(timestamp: i64) -> Block {
        Block::new(
            GENESIS_INDEX,
            GENESIS_PREVIOUS_HASH.to_vec(),
            timestamp,
            Vec::new(),
        )
    }

    /// Same block with a different nonce, re-hashed.
    pub fn with_nonce(mut self, nonce: u64) -> Block {
        self.nonce = nonce;
        self.hash = self.compute_hash().to_vec();
        self
    }

    /// Recomputes the digest over the header and the Merkle root of the objects.
    pub fn compute_hash(&self) -> Hash {
        compute_hash_bytes(self)
    }

    pub fn merkle_root(&self) -> Hash {
        compute_merkle_root(&self.objects)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_previous_hash(&self) -> &[u8] {
        self.previous_hash.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        to_hex(&self.hash)
    }

    pub fn get_objects(&self) -> &[BlockObject] {
        self.objects.as_slice()
    }
}

impl ToHashBytes for Block {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder
            .field_u64("index", self.index)
            .field_bytes("previousHash", &self.previous_hash)
            .field_i64("timestamp", self.timestamp)
            .field_u64("nonce", self.nonce)
            .field_bytes("merkleRoot", &self.merkle_root());
    }

    fn type_tag(&self) -> &'static str {
        "Block"
    }
}
