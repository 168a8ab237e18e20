//! Payload kinds carried by block objects
//!
//! Payloads form a closed tagged union. Each kind has a stable integer id that
//! the binary codec writes ahead of the payload body (see `core::codec`).

use crate::core::hashing::{HashBuilder, ToHashBytes};
use crate::core::transaction::Transaction;

pub const TRANSACTION_TYPE_ID: u32 = 1;
pub const NOTE_TYPE_ID: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Transaction(Transaction),
    Note(Note),
}

impl Payload {
    /// Stable wire id of this payload's kind
    pub fn type_id(&self) -> u32 {
        match self {
            Payload::Transaction(_) => TRANSACTION_TYPE_ID,
            Payload::Note(_) => NOTE_TYPE_ID,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Transaction(_) => "transaction",
            Payload::Note(_) => "note",
        }
    }

    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Payload::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}

impl ToHashBytes for Payload {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder.field_u32("kind", self.type_id());
        match self {
            Payload::Transaction(tx) => builder.field_nested("body", tx),
            Payload::Note(note) => builder.field_nested("body", note),
        };
    }

    fn type_tag(&self) -> &'static str {
        "Payload"
    }
}

impl From<Transaction> for Payload {
    fn from(tx: Transaction) -> Self {
        Payload::Transaction(tx)
    }
}

impl From<Note> for Payload {
    fn from(note: Note) -> Self {
        Payload::Note(note)
    }
}

/// Free-form record for ledgers gated by ownership rather than work,
/// such as a personal password-entry ledger.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Note {
    pub title: String,
    pub body: Option<String>,
    pub attachment: Option<Vec<u8>>,
    pub expires_at: Option<i64>,
    pub weight: Option<f32>,
}

impl Note {
    pub fn new(title: &str) -> Note {
        Note {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: &str) -> Note {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_attachment(mut self, attachment: Vec<u8>) -> Note {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Note {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Note {
        self.weight = Some(weight);
        self
    }
}

impl ToHashBytes for Note {
    fn hash_fields(&self, builder: &mut HashBuilder) {
        builder.field_str("title", &self.title);
        if let Some(body) = &self.body {
            builder.field_str("body", body);
        }
        if let Some(attachment) = &self.attachment {
            builder.field_bytes("attachment", attachment);
        }
        if let Some(expires_at) = self.expires_at {
            builder.field_i64("expiresAt", expires_at);
        }
        if let Some(weight) = self.weight {
            builder.field_f32("weight", weight);
        }
    }

    fn type_tag(&self) -> &'static str {
        "Note"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hashing::compute_hash_bytes;
    use crate::core::transaction::TransactionType;

    #[test]
    fn test_type_ids_are_stable() {
        assert_eq!(Payload::from(Note::new("a")).type_id(), 2);
        assert_eq!(
            Payload::from(Transaction::new(TransactionType::Regular)).type_id(),
            1
        );
    }

    #[test]
    fn test_note_optional_fields_affect_hash() {
        let plain = Note::new("bank");
        let with_body = Note::new("bank").with_body("pin 0000");
        let with_weight = Note::new("bank").with_weight(0.5);
        assert_ne!(compute_hash_bytes(&plain), compute_hash_bytes(&with_body));
        assert_ne!(compute_hash_bytes(&plain), compute_hash_bytes(&with_weight));
    }

    #[test]
    fn test_payload_kinds_do_not_collide() {
        let note = Payload::from(Note::new("x"));
        let tx = Payload::from(Transaction::new(TransactionType::Fee));
        assert_ne!(compute_hash_bytes(&note), compute_hash_bytes(&tx));
        assert_eq!(note.kind_name(), "note");
        assert!(tx.as_transaction().is_some());
    }
}
