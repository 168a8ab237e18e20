use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, generate_random_bytes, serialize};
use crate::wallet::kdf::KdfParams;
use crate::wallet::wallet::{DerivationMode, Wallet};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallet.dat";

/// Salt shared by every fixed-salt wallet, so the passphrase alone recovers it
pub const FIXED_SALT: &[u8] = b"architect-ledger/fixed-wallet-salt/v1";

pub const RANDOM_SALT_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaltPolicy {
    Fixed,
    Random,
}

/// Creates wallets that share one salt policy
#[derive(Debug, Clone, Copy)]
pub struct WalletFactory {
    salt: SaltPolicy,
    kdf: KdfParams,
}

impl WalletFactory {
    pub fn fixed_salt(kdf: KdfParams) -> WalletFactory {
        WalletFactory {
            salt: SaltPolicy::Fixed,
            kdf,
        }
    }

    /// Every wallet gets a fresh salt, which has to be kept to recover it
    pub fn random_salt(kdf: KdfParams) -> WalletFactory {
        WalletFactory {
            salt: SaltPolicy::Random,
            kdf,
        }
    }

    pub fn create(&self, passphrase: &str) -> Wallet {
        self.create_with_mode(passphrase, DerivationMode::Deterministic)
    }

    pub fn create_with_mode(&self, passphrase: &str, mode: DerivationMode) -> Wallet {
        let salt = match self.salt {
            SaltPolicy::Fixed => FIXED_SALT.to_vec(),
            SaltPolicy::Random => generate_random_bytes(RANDOM_SALT_LEN),
        };
        Wallet::new(passphrase, salt, mode, self.kdf)
    }
}

/// What the wallet file keeps about one wallet. Never holds the secret or
/// any private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct WalletRecord {
    pub salt: Vec<u8>,
    pub kdf: KdfParams,
    pub password_hash: Vec<u8>,
    pub addresses: Vec<String>,
    pub created_at: i64,
}

/// Named deterministic wallets, persisted to a wallet file
pub struct Wallets {
    path: PathBuf,
    records: BTreeMap<String, WalletRecord>,
}

impl Wallets {
    /// Loads `path`, or starts empty when the file does not exist yet
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Wallets> {
        let path = path.as_ref().to_path_buf();
        let mut wallets = Wallets {
            path,
            records: BTreeMap::new(),
        };
        if let Err(e) = wallets.load_from_file() {
            error!("Could not load wallets from {}: {e}", wallets.path.display());
            return Err(e);
        }
        Ok(wallets)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = File::open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.records = deserialize(&buf)?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&serialize(&self.records)?)?;
        writer.flush()?;
        Ok(())
    }

    /// Adds a new wallet under `name` and saves the file
    pub fn add_wallet(&mut self, name: &str, wallet: &mut Wallet) -> Result<()> {
        if self.records.contains_key(name) {
            return Err(BlockchainError::Wallet(format!(
                "A wallet named {name} already exists"
            )));
        }
        let record = Self::record_for(wallet, current_timestamp()?)?;
        self.records.insert(name.to_string(), record);
        self.save()?;
        info!("Created wallet {name}");
        Ok(())
    }

    /// Stores the current address list of an existing wallet and saves the file
    pub fn update_wallet(&mut self, name: &str, wallet: &mut Wallet) -> Result<()> {
        let created_at = self.get_record(name)?.created_at;
        let record = Self::record_for(wallet, created_at)?;
        self.records.insert(name.to_string(), record);
        self.save()
    }

    /// Restores wallet `name` from its passphrase by replaying its keys
    pub fn open_wallet(&self, name: &str, passphrase: &str) -> Result<Wallet> {
        let record = self.get_record(name)?;
        let wallet = Wallet::restore(
            passphrase,
            record.salt.clone(),
            record.kdf,
            record.addresses.len(),
        )?;

        let matches = wallet
            .get_password_hash()
            .is_some_and(|hash| crate::utils::constant_time_equals(hash, &record.password_hash));
        if !matches {
            return Err(BlockchainError::Wallet(format!(
                "Wrong passphrase for wallet {name}"
            )));
        }
        if wallet.get_addresses() != record.addresses {
            return Err(BlockchainError::Wallet(format!(
                "Replayed keys of wallet {name} do not match the wallet file"
            )));
        }
        Ok(wallet)
    }

    pub fn get_record(&self, name: &str) -> Result<&WalletRecord> {
        self.records
            .get(name)
            .ok_or_else(|| BlockchainError::Wallet(format!("No wallet named {name}")))
    }

    pub fn get_names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn get_path(&self) -> &Path {
        self.path.as_path()
    }

    fn record_for(wallet: &mut Wallet, created_at: i64) -> Result<WalletRecord> {
        if wallet.get_mode() == DerivationMode::Random {
            return Err(BlockchainError::Wallet(
                "Random-derivation wallets cannot be replayed and are not stored".to_string(),
            ));
        }
        wallet.unlock()?;
        let password_hash = wallet
            .get_password_hash()
            .ok_or_else(|| BlockchainError::Wallet("Wallet has no password hash".to_string()))?
            .to_vec();
        Ok(WalletRecord {
            salt: wallet.get_salt().to_vec(),
            kdf: *wallet.get_kdf_params(),
            password_hash,
            addresses: wallet.get_addresses(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fixed_salt_wallets_agree() {
        let factory = WalletFactory::fixed_salt(KdfParams::light());
        let mut a = factory.create("passphrase");
        let mut b = factory.create("passphrase");
        for _ in 0..3 {
            a.generate_address().unwrap();
            b.generate_address().unwrap();
        }
        assert_eq!(a.get_key_chain(), b.get_key_chain());
        assert_eq!(a.get_salt(), FIXED_SALT);
    }

    #[test]
    fn test_random_salt_wallets_diverge() {
        let factory = WalletFactory::random_salt(KdfParams::light());
        let mut a = factory.create("passphrase");
        let mut b = factory.create("passphrase");
        assert_ne!(a.get_salt(), b.get_salt());
        assert_ne!(a.generate_address().unwrap(), b.generate_address().unwrap());
    }

    #[test]
    fn test_file_round_trip_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);
        let factory = WalletFactory::random_salt(KdfParams::light());

        let mut wallet = factory.create("open sesame");
        let mut wallets = Wallets::load(&path).unwrap();
        wallets.add_wallet("alice", &mut wallet).unwrap();
        wallet.generate_address().unwrap();
        wallet.generate_address().unwrap();
        wallets.update_wallet("alice", &mut wallet).unwrap();

        let reloaded = Wallets::load(&path).unwrap();
        assert_eq!(reloaded.get_names(), vec!["alice".to_string()]);
        let reopened = reloaded.open_wallet("alice", "open sesame").unwrap();
        assert_eq!(reopened.get_addresses(), wallet.get_addresses());
        assert!(reloaded.open_wallet("alice", "wrong").is_err());
        assert!(reloaded.open_wallet("bob", "open sesame").is_err());
    }

    #[test]
    fn test_file_holds_no_private_material() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);
        let mut wallet = WalletFactory::fixed_salt(KdfParams::light()).create("pw");
        wallet.generate_address().unwrap();
        let private_key = wallet.get_key_chain().last().unwrap().get_private_key().to_vec();

        let mut wallets = Wallets::load(&path).unwrap();
        wallets.add_wallet("w", &mut wallet).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes
            .windows(private_key.len())
            .any(|window| window == private_key.as_slice()));
    }

    #[test]
    fn test_duplicate_name_and_random_mode_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let factory = WalletFactory::fixed_salt(KdfParams::light());
        let mut wallets = Wallets::load(temp_dir.path().join(WALLET_FILE)).unwrap();
        wallets.add_wallet("w", &mut factory.create("a")).unwrap();
        assert!(wallets.add_wallet("w", &mut factory.create("b")).is_err());
        let mut random = factory.create_with_mode("c", DerivationMode::Random);
        assert!(wallets.add_wallet("r", &mut random).is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);
        std::fs::write(&path, [0xff, 0xff, 0xff, 0xff]).unwrap();
        assert!(Wallets::load(&path).is_err());
    }
}
