// bincode framing for local files (the wallet file). Blocks use the
// versioned codec in `core::codec` instead.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| BlockchainError::Serialization(format!("Failed to encode: {e}")))
}

/// Decodes `bytes` as one `T`. Bytes left over after the value are an error,
/// so a truncated or concatenated file is never silently accepted.
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, read) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| BlockchainError::Serialization(format!("Failed to decode: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "{} trailing bytes after value",
            bytes.len() - read
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{KdfParams, WalletRecord};
    use std::collections::BTreeMap;

    fn record() -> WalletRecord {
        WalletRecord {
            salt: vec![1; 16],
            kdf: KdfParams::light(),
            password_hash: vec![2; 32],
            addresses: vec!["ab".to_string(), "cd".to_string()],
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_wallet_records_round_trip() {
        let mut records = BTreeMap::new();
        records.insert("main".to_string(), record());
        let bytes = serialize(&records).unwrap();
        let decoded: BTreeMap<String, WalletRecord> = deserialize(&bytes).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&record()).unwrap();
        bytes.push(0);
        assert!(deserialize::<WalletRecord>(&bytes).is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = serialize(&record()).unwrap();
        assert!(deserialize::<WalletRecord>(&bytes[..bytes.len() / 2]).is_err());
    }
}
