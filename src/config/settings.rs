use crate::core::block::{Block, DEFAULT_GENESIS_TIMESTAMP};
use crate::core::proof_of_work::{
    DifficultySchedule, DifficultyStep, NullProofOfWork, ProofOfWork, ScheduledProofOfWork,
};
use crate::error::{BlockchainError, Result};
use crate::wallet::kdf::KdfParams;
use log::LevelFilter;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration of the running binary. Set once at startup, read-only after.
pub static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

pub const DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const PEERS_KEY: &str = "LEDGER_PEERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowKind {
    Null,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfProfile {
    /// scrypt N = 2^18 and 2^16 PBKDF2 rounds
    Standard,
    /// Cheap costs for development wallets
    Light,
}

impl KdfProfile {
    pub fn params(self) -> KdfParams {
        match self {
            KdfProfile::Standard => KdfParams::default(),
            KdfProfile::Light => KdfParams::light(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub address: String,
    pub id: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            address: DEFAULT_NODE_ADDR.to_string(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub kind: StoreKind,
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            kind: StoreKind::Sled,
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofOfWorkSettings {
    pub kind: PowKind,
    pub schedule: Vec<DifficultyStep>,
}

impl Default for ProofOfWorkSettings {
    fn default() -> Self {
        ProofOfWorkSettings {
            kind: PowKind::Scheduled,
            schedule: vec![DifficultyStep {
                from_index: 0,
                bits: 16,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisSettings {
    pub timestamp: i64,
}

impl Default for GenesisSettings {
    fn default() -> Self {
        GenesisSettings {
            timestamp: DEFAULT_GENESIS_TIMESTAMP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    pub file: PathBuf,
    pub kdf_profile: KdfProfile,
}

impl Default for WalletSettings {
    fn default() -> Self {
        WalletSettings {
            file: PathBuf::from(crate::wallet::WALLET_FILE),
            kdf_profile: KdfProfile::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeSettings,
    pub storage: StorageSettings,
    pub peers: Vec<String>,
    pub log_level: String,
    pub proof_of_work: ProofOfWorkSettings,
    pub genesis: GenesisSettings,
    pub wallet: WalletSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node: NodeSettings::default(),
            storage: StorageSettings::default(),
            peers: Vec::new(),
            log_level: "info".to_string(),
            proof_of_work: ProofOfWorkSettings::default(),
            genesis: GenesisSettings::default(),
            wallet: WalletSettings::default(),
        }
    }
}

impl Config {
    /// Reads `path` (or the defaults when `None`), then applies the
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Config::from_toml_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `NODE_ADDRESS`, `NODE_ID`, `LEDGER_DATA_DIR` and `LEDGER_PEERS`
    /// (comma separated) as returned by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node.address = addr;
        }
        if let Some(node_id) = lookup(NODE_ID_KEY) {
            self.node.id = Some(node_id);
        }
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(peers) = lookup(PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.log_level_filter()?;
        if self.proof_of_work.kind == PowKind::Scheduled {
            DifficultySchedule::new(self.proof_of_work.schedule.clone())?;
        }
        Ok(())
    }

    /// Installs this configuration process-wide. Only the first call wins.
    pub fn install(self) -> Result<&'static Config> {
        GLOBAL_CONFIG
            .set(self)
            .map_err(|_| BlockchainError::Config("Configuration already installed".to_string()))?;
        Config::global()
    }

    pub fn global() -> Result<&'static Config> {
        GLOBAL_CONFIG
            .get()
            .ok_or_else(|| BlockchainError::Config("Configuration not installed".to_string()))
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level).map_err(|_| {
            BlockchainError::Config(format!("Unknown log level {}", self.log_level))
        })
    }

    /// Node id from the config, or the port of the node address
    /// ("127.0.0.1:2001" -> "2001")
    pub fn node_id(&self) -> String {
        if let Some(id) = &self.node.id {
            return id.clone();
        }
        match self.node.address.rsplit(':').next() {
            Some(port) if !port.is_empty() => port.to_string(),
            _ => "default".to_string(),
        }
    }

    /// Per-node database directory, so several nodes can share a machine
    pub fn node_data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(format!("node_{}", self.node_id()))
    }

    pub fn genesis_block(&self) -> Block {
        Block::genesis(self.genesis.timestamp)
    }

    pub fn proof_of_work(&self) -> Result<Box<dyn ProofOfWork>> {
        Ok(match self.proof_of_work.kind {
            PowKind::Null => Box::new(NullProofOfWork),
            PowKind::Scheduled => Box::new(ScheduledProofOfWork::new(DifficultySchedule::new(
                self.proof_of_work.schedule.clone(),
            )?)),
        })
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.wallet.kdf_profile.params()
    }
}
