// Transactions are the main payload kind carried in block objects.
// Inputs reference an output of an earlier transaction and carry the spender's
// public key in `address`; outputs name the recipient's public key.
// Each input is signed over the digest of a trimmed copy with every signature removed.

use crate::core::hashing::{compute_hash_bytes, HashBuilder, ToHashBytes};
use crate::error::{BlockchainError, Result};
use crate::utils::Hash;
use crate::wallet::{verify_signature, KeyPair};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Regular,
    Fee,
    Reward,
}

impl TransactionType {
    pub fn tag(self) -> u8 {
        match self {
            TransactionType::Regular => 0,
            TransactionType::Fee => 1,
            TransactionType::Reward => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TransactionType::Regular),
            1 => Some(TransactionType::Fee),
            2 => Some(TransactionType::Reward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Input,
    Output,
}

impl ItemType {
    pub fn tag(self) -> u8 {
        match self {
            ItemType::Input => 0,
            ItemType::Output => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ItemType::Input),
            1 => Some(ItemType::Output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionItem {
    transaction_id: String,
    item_type: ItemType,
    index: u32,
    amount: u64,
    address: Vec<u8>,
    signature: Option<Vec<u8>>,
}

impl TransactionItem {
    pub fn new(
        transaction_id: String,
        item_type: ItemType,
        index: u32,
        amount: u64,
        address: Vec<u8>,
        signature: Option<Vec<u8>>,
    ) -> TransactionItem {
        TransactionItem {
            transaction_id,
            item_type,
            index,
            amount,
            address,
            signature,
        }
    }

    pub fn get_transaction_id(&self) -> &str {
        self.transaction_id.as_str()
    }

    pub fn get_type(&self) -> ItemType {
        self.item_type
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_address(&self) -> &[u8] {
        self.address.as_slice()
    }

    pub fn get_signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }
}

impl ToHashBytes for TransactionItem {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder
            .field_str("transactionId", &self.transaction_id)
            .field_u32("type", u32::from(self.item_type.tag()))
            .field_u32("index", self.index)
            .field_u64("amount", self.amount)
            .field_bytes("address", &self.address);
        if let Some(signature) = &self.signature {
            builder.field_bytes("signature", signature);
        }
    }

    fn type_tag(&self) -> &'static str {
        "TransactionItem"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionData {
    pub inputs: Vec<TransactionItem>,
    pub outputs: Vec<TransactionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: String,
    tx_type: TransactionType,
    data: TransactionData,
}

impl Transaction {
    /// A new, empty transaction with a random id.
    pub fn new(tx_type: TransactionType) -> Transaction {
        Self::with_id(Uuid::new_v4().to_string(), tx_type, TransactionData::default())
    }

    pub fn with_id(id: String, tx_type: TransactionType, data: TransactionData) -> Transaction {
        Transaction { id, tx_type, data }
    }

    /// Reward transactions create value and have no inputs.
    pub fn new_reward(address: &[u8], amount: u64) -> Transaction {
        let mut tx = Transaction::new(TransactionType::Reward);
        tx.add_output(amount, address);
        tx
    }

    /// Spend output `index` of transaction `transaction_id`, owned by `public_key`.
    pub fn add_input(
        &mut self,
        transaction_id: &str,
        index: u32,
        amount: u64,
        public_key: &[u8],
    ) -> &mut Self {
        self.data.inputs.push(TransactionItem::new(
            transaction_id.to_string(),
            ItemType::Input,
            index,
            amount,
            public_key.to_vec(),
            None,
        ));
        self
    }

    pub fn add_output(&mut self, amount: u64, address: &[u8]) -> &mut Self {
        let index = self.data.outputs.len() as u32;
        self.data.outputs.push(TransactionItem::new(
            self.id.clone(),
            ItemType::Output,
            index,
            amount,
            address.to_vec(),
            None,
        ));
        self
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_type(&self) -> TransactionType {
        self.tx_type
    }

    pub fn get_data(&self) -> &TransactionData {
        &self.data
    }

    pub fn get_inputs(&self) -> &[TransactionItem] {
        self.data.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[TransactionItem] {
        self.data.outputs.as_slice()
    }

    /// Sum of the output amounts, `None` when it does not fit a `u64`
    pub fn total_output(&self) -> Option<u64> {
        self.data
            .outputs
            .iter()
            .try_fold(0u64, |total, o| total.checked_add(o.amount))
    }

    fn trimmed_copy(&self) -> Transaction {
        let strip = |items: &[TransactionItem]| {
            items
                .iter()
                .map(|item| TransactionItem {
                    signature: None,
                    ..item.clone()
                })
                .collect::<Vec<_>>()
        };
        Transaction {
            id: self.id.clone(),
            tx_type: self.tx_type,
            data: TransactionData {
                inputs: strip(&self.data.inputs),
                outputs: strip(&self.data.outputs),
            },
        }
    }

    /// Digest every input signature commits to.
    pub fn signing_digest(&self) -> Hash {
        compute_hash_bytes(&self.trimmed_copy())
    }

    /// Signs every input whose address is `key_pair`'s public key.
    pub fn sign_inputs(&mut self, key_pair: &KeyPair) -> Result<usize> {
        let digest = self.signing_digest();
        let mut signed = 0;
        for input in self
            .data
            .inputs
            .iter_mut()
            .filter(|i| i.address == key_pair.get_public_key())
        {
            input.signature = Some(key_pair.sign(&digest)?);
            signed += 1;
        }

        if signed == 0 {
            return Err(BlockchainError::Wallet(format!(
                "No input of transaction {} belongs to key {}",
                self.id,
                key_pair.get_index()
            )));
        }
        Ok(signed)
    }

    /// Every input carries a valid signature by the key named in its address.
    pub fn verify_signatures(&self) -> bool {
        let digest = self.signing_digest();
        for (idx, input) in self.data.inputs.iter().enumerate() {
            let Some(signature) = input.signature.as_deref() else {
                warn!("Transaction {} input {idx} is unsigned", self.id);
                return false;
            };
            if !verify_signature(&input.address, &digest, signature) {
                warn!("Transaction {} input {idx} has a bad signature", self.id);
                return false;
            }
        }
        true
    }
}

impl ToHashBytes for Transaction {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder
            .field_str("id", &self.id)
            .field_u32("type", u32::from(self.tx_type.tag()))
            .field_list("inputs", &self.data.inputs)
            .field_list("outputs", &self.data.outputs);
    }

    fn type_tag(&self) -> &'static str {
        "Transaction"
    }
}
