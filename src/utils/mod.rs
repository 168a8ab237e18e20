//! Utility functions and helpers
//!
//! This module contains cryptographic utilities, encoding functions,
//! and other helper functions used throughout the ledger.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    constant_time_equals, current_timestamp, double_sha256, from_hex, generate_random_bytes,
    sha256_digest, to_hex, Hash, HASH_LEN,
};

pub use serialization::{deserialize, serialize};
