//! Error handling for the ledger
//!
//! This module provides the error types for every ledger operation. Validation
//! failures carry structured detail so callers can tell exactly which check a
//! block or chain failed.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Top-level error type for ledger operations
#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainError {
    /// A candidate block failed one of the `check_block` checks
    BlockValidation(BlockValidationError),
    /// A candidate chain failed `check_chain` or the longest-chain rule
    ChainValidation(ChainValidationError),
    /// A binary record could not be decoded
    Decode(DecodeError),
    /// The store refused an append
    Storage(StorageViolation),
    /// The chain was used before `init()`
    NotInitialized,
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization errors outside the block codec (wallet file, peer messages)
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Mining errors
    Mining(String),
}

/// The four `check_block` failures, in the order they are checked. A payload
/// entry whose stored hash disagrees with its content fails the hash check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockValidationError {
    IndexMismatch {
        expected: u64,
        actual: u64,
    },
    PreviousHashMismatch {
        expected: String,
        actual: String,
    },
    HashMismatch {
        expected: String,
        actual: String,
    },
    ObjectHashMismatch {
        position: usize,
        expected: String,
        actual: String,
    },
    InsufficientWork {
        index: u64,
        measure: String,
        threshold: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainValidationError {
    EmptyChain,
    GenesisMismatch {
        expected: String,
        actual: String,
    },
    /// The pair `(index - 1, index)` failed block validation
    InvalidPair {
        index: usize,
        cause: BlockValidationError,
    },
    /// Longest-chain rule: equal or shorter chains are never taken
    ChainNotLonger {
        local: usize,
        candidate: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    VersionTooNew { found: i32, supported: i32 },
    InvalidVersion(i32),
    UnexpectedEof { needed: usize, remaining: usize },
    TrailingBytes(usize),
    NegativeLength(i32),
    UnknownPayloadType(u32),
    InvalidEnumTag { kind: &'static str, tag: u8 },
    InvalidUtf8(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageViolation {
    EmptyHash,
    DuplicateHash(String),
    NonMonotonicIndex { expected: u64, actual: u64 },
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::BlockValidation(e) => write!(f, "Invalid block: {e}"),
            BlockchainError::ChainValidation(e) => write!(f, "Invalid chain: {e}"),
            BlockchainError::Decode(e) => write!(f, "Decode error: {e}"),
            BlockchainError::Storage(e) => write!(f, "Add rejected by store: {e}"),
            BlockchainError::NotInitialized => write!(f, "Blockchain has not been initialized"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl fmt::Display for BlockValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockValidationError::IndexMismatch { expected, actual } => {
                write!(f, "index mismatch: expected {expected}, got {actual}")
            }
            BlockValidationError::PreviousHashMismatch { expected, actual } => {
                write!(f, "previous hash mismatch: expected {expected}, got {actual}")
            }
            BlockValidationError::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch: recomputed {expected}, block claims {actual}")
            }
            BlockValidationError::ObjectHashMismatch {
                position,
                expected,
                actual,
            } => write!(
                f,
                "object {position} hash mismatch: recomputed {expected}, object claims {actual}"
            ),
            BlockValidationError::InsufficientWork {
                index,
                measure,
                threshold,
            } => write!(
                f,
                "insufficient work at index {index}: measure {measure} is not below {threshold}"
            ),
        }
    }
}

impl fmt::Display for ChainValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainValidationError::EmptyChain => write!(f, "candidate chain is empty"),
            ChainValidationError::GenesisMismatch { expected, actual } => {
                write!(f, "genesis mismatch: expected {expected}, got {actual}")
            }
            ChainValidationError::InvalidPair { index, cause } => {
                write!(f, "blocks {} -> {index} do not link: {cause}", index.saturating_sub(1))
            }
            ChainValidationError::ChainNotLonger { local, candidate } => write!(
                f,
                "candidate chain of length {candidate} is not longer than the local {local}"
            ),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::VersionTooNew { found, supported } => write!(
                f,
                "record version {found} is newer than the supported version {supported}"
            ),
            DecodeError::InvalidVersion(v) => write!(f, "invalid record version {v}"),
            DecodeError::UnexpectedEof { needed, remaining } => write!(
                f,
                "unexpected end of input: needed {needed} bytes, {remaining} remaining"
            ),
            DecodeError::TrailingBytes(n) => write!(f, "{n} trailing bytes after record"),
            DecodeError::NegativeLength(n) => write!(f, "negative length prefix {n}"),
            DecodeError::UnknownPayloadType(id) => write!(f, "unknown payload type id {id}"),
            DecodeError::InvalidEnumTag { kind, tag } => {
                write!(f, "invalid {kind} tag {tag}")
            }
            DecodeError::InvalidUtf8(msg) => write!(f, "invalid UTF-8 string: {msg}"),
        }
    }
}

impl fmt::Display for StorageViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageViolation::EmptyHash => write!(f, "block has no hash"),
            StorageViolation::DuplicateHash(hash) => write!(f, "duplicate block hash {hash}"),
            StorageViolation::NonMonotonicIndex { expected, actual } => {
                write!(f, "non-monotonic index: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for BlockchainError {}
impl std::error::Error for BlockValidationError {}
impl std::error::Error for ChainValidationError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for StorageViolation {}

impl From<BlockValidationError> for BlockchainError {
    fn from(err: BlockValidationError) -> Self {
        BlockchainError::BlockValidation(err)
    }
}

impl From<ChainValidationError> for BlockchainError {
    fn from(err: ChainValidationError) -> Self {
        BlockchainError::ChainValidation(err)
    }
}

impl From<DecodeError> for BlockchainError {
    fn from(err: DecodeError) -> Self {
        BlockchainError::Decode(err)
    }
}

impl From<StorageViolation> for BlockchainError {
    fn from(err: StorageViolation) -> Self {
        BlockchainError::Storage(err)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
