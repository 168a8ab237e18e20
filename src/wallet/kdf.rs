//! Passphrase to secret derivation
//!
//! The wallet secret combines two independent KDFs so that a weakness in one
//! does not expose the secret:
//!
//! ```text
//! s1 = scrypt(passphrase || 0x01, salt || 0x01, N, r, p, 32)
//! s2 = PBKDF2-HMAC-SHA256(passphrase || 0x02, salt || 0x02, iterations, 32)
//! secret = s1 XOR s2
//! ```

use crate::error::{BlockchainError, Result};
use crate::utils::constant_time_equals;
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::thread::{self, JoinHandle};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const SECRET_LEN: usize = 32;

/// Cost parameters of both KDFs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct KdfParams {
    /// scrypt cost as a power of two (`N = 2^scrypt_log_n`)
    pub scrypt_log_n: u8,
    pub scrypt_r: u32,
    pub scrypt_p: u32,
    pub pbkdf2_iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            scrypt_log_n: 18,
            scrypt_r: 8,
            scrypt_p: 1,
            pbkdf2_iterations: 1 << 16,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests and throwaway development wallets
    pub fn light() -> Self {
        KdfParams {
            scrypt_log_n: 10,
            scrypt_r: 8,
            scrypt_p: 1,
            pbkdf2_iterations: 1_024,
        }
    }
}

/// A derived wallet secret. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Secret {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_equals(&self.0, &other.0)
    }
}

impl Eq for Secret {}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

fn with_domain_byte(data: &[u8], byte: u8) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(data.len() + 1));
    out.extend_from_slice(data);
    out.push(byte);
    out
}

/// Derives the wallet secret from a passphrase and salt
pub fn derive_secret(passphrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<Secret> {
    let scrypt_params = scrypt::Params::new(
        params.scrypt_log_n,
        params.scrypt_r,
        params.scrypt_p,
        SECRET_LEN,
    )
    .map_err(|e| BlockchainError::Crypto(format!("Invalid scrypt parameters: {e}")))?;
    let iterations = NonZeroU32::new(params.pbkdf2_iterations).ok_or_else(|| {
        BlockchainError::Crypto("PBKDF2 needs at least one iteration".to_string())
    })?;

    let mut s1 = Zeroizing::new([0u8; SECRET_LEN]);
    scrypt::scrypt(
        &with_domain_byte(passphrase, 0x01),
        &with_domain_byte(salt, 0x01),
        &scrypt_params,
        s1.as_mut_slice(),
    )
    .map_err(|e| BlockchainError::Crypto(format!("scrypt failed: {e}")))?;

    let mut s2 = Zeroizing::new([0u8; SECRET_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &with_domain_byte(salt, 0x02),
        &with_domain_byte(passphrase, 0x02),
        s2.as_mut_slice(),
    );

    let mut secret = [0u8; SECRET_LEN];
    for (i, byte) in secret.iter_mut().enumerate() {
        *byte = s1[i] ^ s2[i];
    }
    Ok(Secret(secret))
}

/// Secret derivation running on its own worker thread
pub struct SecretDerivation {
    handle: JoinHandle<Result<Secret>>,
}

impl SecretDerivation {
    pub fn join(self) -> Result<Secret> {
        self.handle
            .join()
            .map_err(|_| BlockchainError::Crypto("Key derivation thread panicked".to_string()))?
    }
}

/// Runs `derive_secret` off the calling thread
pub fn spawn_derive_secret(
    passphrase: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    params: KdfParams,
) -> Result<SecretDerivation> {
    let handle = thread::Builder::new()
        .name("kdf".to_string())
        .spawn(move || derive_secret(&passphrase, &salt, &params))?;
    Ok(SecretDerivation { handle })
}
