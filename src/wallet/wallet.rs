use crate::core::hashing::HashBuilder;
use crate::error::{BlockchainError, Result};
use crate::utils::{constant_time_equals, Hash};
use crate::wallet::kdf::{derive_secret, spawn_derive_secret, KdfParams, Secret};
use crate::wallet::keychain::{KeyChain, KeyPair};
use log::info;
use zeroize::Zeroizing;

/// How a wallet produces new key pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationMode {
    /// Every key follows from the secret; the chain can be replayed
    Deterministic,
    /// Every key comes from fresh randomness; nothing can be replayed
    Random,
}

/// Hash kept to check a passphrase without storing the secret
pub fn password_hash(secret: &Secret) -> Hash {
    let mut builder = HashBuilder::new("PasswordHash");
    builder.field_bytes("secret", secret.as_bytes());
    builder.finish()
}

pub struct Wallet {
    salt: Vec<u8>,
    kdf: KdfParams,
    mode: DerivationMode,
    // Held only until the secret is derived
    passphrase: Option<Zeroizing<String>>,
    secret: Option<Secret>,
    password_hash: Option<Hash>,
    key_chain: KeyChain,
}

impl Wallet {
    pub fn new(passphrase: &str, salt: Vec<u8>, mode: DerivationMode, kdf: KdfParams) -> Wallet {
        Wallet {
            salt,
            kdf,
            mode,
            passphrase: Some(Zeroizing::new(passphrase.to_string())),
            secret: None,
            password_hash: None,
            key_chain: KeyChain::new(),
        }
    }

    /// Rebuilds a deterministic wallet by replaying its first `count` keys
    pub fn restore(
        passphrase: &str,
        salt: Vec<u8>,
        kdf: KdfParams,
        count: usize,
    ) -> Result<Wallet> {
        let mut wallet = Wallet::new(passphrase, salt, DerivationMode::Deterministic, kdf);
        let secret = wallet.unlock()?.clone();
        wallet.key_chain = KeyChain::replay(&secret, count)?;
        Ok(wallet)
    }

    /// Derives the secret on a worker thread if that has not happened yet
    pub fn unlock(&mut self) -> Result<&Secret> {
        if self.secret.is_none() {
            let passphrase = self.passphrase.take().ok_or_else(|| {
                BlockchainError::Wallet("Wallet has neither a secret nor a passphrase".to_string())
            })?;
            let secret = spawn_derive_secret(
                Zeroizing::new(passphrase.as_bytes().to_vec()),
                self.salt.clone(),
                self.kdf,
            )?
            .join()?;
            self.password_hash = Some(password_hash(&secret));
            self.secret = Some(secret);
        }
        self.secret
            .as_ref()
            .ok_or_else(|| BlockchainError::Wallet("Wallet secret missing".to_string()))
    }

    /// Derives the next key pair and returns its hex public key
    pub fn generate_address(&mut self) -> Result<String> {
        // Random keys need no secret
        let pair = match self.mode {
            DerivationMode::Deterministic => {
                let secret = self.unlock()?.clone();
                self.key_chain.derive_next(&secret)?
            }
            DerivationMode::Random => self.key_chain.push_random()?,
        };
        let address = pair.get_address();
        info!("Generated address #{}: {address}", pair.get_index());
        Ok(address)
    }

    /// Re-derives from `passphrase` and compares with the stored password hash
    pub fn verify_passphrase(&mut self, passphrase: &str) -> Result<bool> {
        self.unlock()?;
        let expected = self
            .password_hash
            .ok_or_else(|| BlockchainError::Wallet("Wallet has no password hash".to_string()))?;
        let candidate = derive_secret(passphrase.as_bytes(), &self.salt, &self.kdf)?;
        Ok(constant_time_equals(&password_hash(&candidate), &expected))
    }

    pub fn get_salt(&self) -> &[u8] {
        self.salt.as_slice()
    }

    pub fn get_kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn get_mode(&self) -> DerivationMode {
        self.mode
    }

    pub fn get_password_hash(&self) -> Option<&Hash> {
        self.password_hash.as_ref()
    }

    pub fn get_key_chain(&self) -> &KeyChain {
        &self.key_chain
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.key_chain.iter().map(KeyPair::get_address).collect()
    }

    pub fn get_key_pair(&self, public_key: &[u8]) -> Option<&KeyPair> {
        self.key_chain.find_by_public_key(public_key)
    }
}
