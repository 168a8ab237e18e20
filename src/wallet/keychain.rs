use crate::error::{BlockchainError, Result};
use crate::utils::{generate_random_bytes, sha256_digest, to_hex};
use crate::wallet::kdf::Secret;
use ring::signature::{Ed25519KeyPair, KeyPair as _, UnparsedPublicKey, ED25519};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Domain salt mixed into every step of the deterministic key chain
pub const DERIVATION_SALT: &[u8] = b"architect-ledger/keychain/v1";

pub const SEED_LEN: usize = 32;

/// An Ed25519 key pair. `private_key` is the 32-byte seed the pair was built from.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    index: u32,
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    pub fn from_seed(index: u32, seed: &[u8]) -> Result<KeyPair> {
        let pair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| BlockchainError::Crypto(format!("Invalid Ed25519 seed: {e}")))?;
        Ok(KeyPair {
            index,
            public_key: pair.public_key().as_ref().to_vec(),
            private_key: seed.to_vec(),
        })
    }

    /// 1-based position in the key chain
    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_private_key(&self) -> &[u8] {
        self.private_key.as_slice()
    }

    /// Hex public key, used as the address
    pub fn get_address(&self) -> String {
        to_hex(&self.public_key)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let pair = Ed25519KeyPair::from_seed_unchecked(&self.private_key)
            .map_err(|e| BlockchainError::Crypto(format!("Invalid Ed25519 seed: {e}")))?;
        Ok(pair.sign(message).as_ref().to_vec())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("index", &self.index)
            .field("public_key", &to_hex(&self.public_key))
            .finish()
    }
}

/// Checks an Ed25519 signature
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, signature)
        .is_ok()
}

/// Seed of the key that follows `previous` in a deterministic chain
fn next_seed(previous: &KeyPair) -> Zeroizing<Vec<u8>> {
    let mut data = Zeroizing::new(previous.get_private_key().to_vec());
    data.extend_from_slice(DERIVATION_SALT);
    Zeroizing::new(sha256_digest(&data).to_vec())
}

/// Append-only sequence of derived key pairs.
///
/// In a deterministic chain the first key comes from the wallet secret and
/// every later key from its predecessor's private key, so recovering key `n`
/// means replaying keys `1..n` in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChain {
    pairs: Vec<KeyPair>,
}

impl KeyChain {
    pub fn new() -> KeyChain {
        KeyChain::default()
    }

    /// Rebuilds the first `count` deterministic keys from `secret`
    pub fn replay(secret: &Secret, count: usize) -> Result<KeyChain> {
        let mut chain = KeyChain::new();
        for _ in 0..count {
            chain.derive_next(secret)?;
        }
        Ok(chain)
    }

    /// Appends a key pair built from `seed` with the next index
    pub fn push(&mut self, seed: &[u8]) -> Result<&KeyPair> {
        let index = u32::try_from(self.pairs.len() + 1)
            .map_err(|_| BlockchainError::Wallet("Key chain is full".to_string()))?;
        self.pairs.push(KeyPair::from_seed(index, seed)?);
        self.last()
            .ok_or_else(|| BlockchainError::Wallet("Key chain push lost its key".to_string()))
    }

    /// Next deterministic key
    pub fn derive_next(&mut self, secret: &Secret) -> Result<&KeyPair> {
        let seed = match self.pairs.last() {
            None => Zeroizing::new(secret.as_bytes().to_vec()),
            Some(last) => next_seed(last),
        };
        self.push(&seed)
    }

    /// Next key from a fresh random seed. Cannot be replayed.
    pub fn push_random(&mut self) -> Result<&KeyPair> {
        let seed = Zeroizing::new(generate_random_bytes(SEED_LEN));
        self.push(&seed)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn last(&self) -> Option<&KeyPair> {
        self.pairs.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyPair> {
        self.pairs.iter()
    }

    pub fn find_by_public_key(&self, public_key: &[u8]) -> Option<&KeyPair> {
        self.pairs.iter().find(|p| p.get_public_key() == public_key)
    }
}

impl<'a> IntoIterator for &'a KeyChain {
    type Item = &'a KeyPair;
    type IntoIter = std::slice::Iter<'a, KeyPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> Secret {
        Secret::from_bytes([byte; 32])
    }

    #[test]
    fn test_first_key_comes_from_secret() {
        let mut chain = KeyChain::new();
        let first = chain.derive_next(&secret(4)).unwrap().clone();
        assert_eq!(first.get_index(), 1);
        assert_eq!(first.get_private_key(), &[4u8; 32]);
        assert_eq!(first, KeyPair::from_seed(1, &[4; 32]).unwrap());
    }

    #[test]
    fn test_each_key_derives_from_previous() {
        let chain = KeyChain::replay(&secret(1), 3).unwrap();
        let pairs: Vec<&KeyPair> = chain.iter().collect();
        for window in pairs.windows(2) {
            let expected = next_seed(window[0]);
            assert_eq!(window[1].get_private_key(), expected.as_slice());
            assert_eq!(window[1].get_index(), window[0].get_index() + 1);
        }
    }

    #[test]
    fn test_replay_reproduces_chain() {
        let a = KeyChain::replay(&secret(9), 5).unwrap();
        let b = KeyChain::replay(&secret(9), 5).unwrap();
        assert_eq!(a, b);
        let prefix = KeyChain::replay(&secret(9), 2).unwrap();
        assert!(prefix.iter().zip(a.iter()).all(|(x, y)| x == y));
        assert_ne!(a, KeyChain::replay(&secret(8), 5).unwrap());
    }

    #[test]
    fn test_random_keys_differ() {
        let mut chain = KeyChain::new();
        let a = chain.push_random().unwrap().clone();
        let b = chain.push_random().unwrap().clone();
        assert_ne!(a.get_public_key(), b.get_public_key());
        assert_eq!(b.get_index(), 2);
    }

    #[test]
    fn test_sign_and_verify() {
        let pair = KeyPair::from_seed(1, &[3; 32]).unwrap();
        let signature = pair.sign(b"message").unwrap();
        assert!(verify_signature(pair.get_public_key(), b"message", &signature));
        assert!(!verify_signature(pair.get_public_key(), b"massage", &signature));
        let other = KeyPair::from_seed(1, &[4; 32]).unwrap();
        assert!(!verify_signature(other.get_public_key(), b"message", &signature));
    }

    #[test]
    fn test_bad_seed_length() {
        assert!(KeyPair::from_seed(1, &[1; 31]).is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let pair = KeyPair::from_seed(1, &[0xaa; 32]).unwrap();
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains(&"aa".repeat(32)));
    }
}
