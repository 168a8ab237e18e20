//! Versioned binary record format for blocks and block objects
//!
//! Every record begins with an `i32` format version. Integers are little-endian,
//! buffers and strings carry an `i32` length prefix, and every optional field is
//! preceded by a one-byte presence flag. Payloads are written as their registry
//! id followed by the kind-specific body.
//!
//! A reader refuses any record whose version is newer than [`MAX_FORMAT_VERSION`].

use crate::core::block::{Block, BlockObject};
use crate::core::payload::{Note, Payload, NOTE_TYPE_ID, TRANSACTION_TYPE_ID};
use crate::core::transaction::{
    ItemType, Transaction, TransactionData, TransactionItem, TransactionType,
};
use crate::error::{BlockchainError, DecodeError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Version written by this build.
pub const FORMAT_VERSION: i32 = 1;
/// Newest version this build can read.
pub const MAX_FORMAT_VERSION: i32 = 1;

pub type PayloadEncoder = fn(&Payload, &mut BinaryWriter) -> Result<()>;
pub type PayloadDecoder = fn(&mut BinaryReader<'_>) -> std::result::Result<Payload, DecodeError>;

/// Process-wide registry of the built-in payload kinds. Built once, read-only.
pub static DEFAULT_REGISTRY: Lazy<PayloadRegistry> = Lazy::new(PayloadRegistry::with_builtin_kinds);

#[derive(Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            BlockchainError::Serialization(format!("Length {len} does not fit in an i32 prefix"))
        })?;
        self.write_i32(len);
        Ok(())
    }

    pub fn write_buffer(&mut self, value: &[u8]) -> Result<()> {
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_buffer(value.as_bytes())
    }

    pub fn write_opt_buffer(&mut self, value: Option<&[u8]>) -> Result<()> {
        self.write_bool(value.is_some());
        match value {
            Some(v) => self.write_buffer(v),
            None => Ok(()),
        }
    }

    pub fn write_opt_string(&mut self, value: Option<&str>) -> Result<()> {
        self.write_opt_buffer(value.map(str::as_bytes))
    }

    pub fn write_opt_i64(&mut self, value: Option<i64>) {
        self.write_bool(value.is_some());
        if let Some(v) = value {
            self.write_i64(v);
        }
    }

    pub fn write_opt_f32(&mut self, value: Option<f32>) {
        self.write_bool(value.is_some());
        if let Some(v) = value {
            self.write_f32(v);
        }
    }
}

pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

type DecodeResult<T> = std::result::Result<T, DecodeError>;

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidEnumTag { kind: "bool", tag }),
        }
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_len(&mut self) -> DecodeResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength(len))
    }

    pub fn read_buffer(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> DecodeResult<String> {
        String::from_utf8(self.read_buffer()?)
            .map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }

    pub fn read_opt_buffer(&mut self) -> DecodeResult<Option<Vec<u8>>> {
        if self.read_bool()? {
            self.read_buffer().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_opt_string(&mut self) -> DecodeResult<Option<String>> {
        if self.read_bool()? {
            self.read_string().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_opt_i64(&mut self) -> DecodeResult<Option<i64>> {
        if self.read_bool()? {
            self.read_i64().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_opt_f32(&mut self) -> DecodeResult<Option<f32>> {
        if self.read_bool()? {
            self.read_f32().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads the record header and enforces the version guard.
    pub fn read_version(&mut self) -> DecodeResult<i32> {
        let version = self.read_i32()?;
        if version > MAX_FORMAT_VERSION {
            return Err(DecodeError::VersionTooNew {
                found: version,
                supported: MAX_FORMAT_VERSION,
            });
        }
        if version < 1 {
            return Err(DecodeError::InvalidVersion(version));
        }
        Ok(version)
    }

    pub fn finish(self) -> DecodeResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

struct PayloadHandlers {
    encode: PayloadEncoder,
    decode: PayloadDecoder,
}

/// Maps payload kinds to their stable ids and codecs
pub struct PayloadRegistry {
    handlers: HashMap<u32, PayloadHandlers>,
}

impl PayloadRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::empty();
        registry.register(TRANSACTION_TYPE_ID, encode_transaction, decode_transaction);
        registry.register(NOTE_TYPE_ID, encode_note, decode_note);
        registry
    }

    /// Later registrations for the same id replace earlier ones.
    pub fn register(&mut self, type_id: u32, encode: PayloadEncoder, decode: PayloadDecoder) {
        self.handlers
            .insert(type_id, PayloadHandlers { encode, decode });
    }

    pub fn is_registered(&self, type_id: u32) -> bool {
        self.handlers.contains_key(&type_id)
    }

    fn write(&self, payload: &Payload, writer: &mut BinaryWriter) -> Result<()> {
        let type_id = payload.type_id();
        let handlers = self.handlers.get(&type_id).ok_or_else(|| {
            BlockchainError::Serialization(format!(
                "No codec registered for {} payloads (id {type_id})",
                payload.kind_name()
            ))
        })?;
        writer.write_u32(type_id);
        (handlers.encode)(payload, writer)
    }

    fn read(&self, reader: &mut BinaryReader<'_>) -> DecodeResult<Payload> {
        let type_id = reader.read_u32()?;
        let handlers = self
            .handlers
            .get(&type_id)
            .ok_or(DecodeError::UnknownPayloadType(type_id))?;
        (handlers.decode)(reader)
    }
}

/// Encodes and decodes block records against a payload registry
#[derive(Clone, Copy)]
pub struct BlockCodec<'r> {
    registry: &'r PayloadRegistry,
}

impl Default for BlockCodec<'static> {
    fn default() -> Self {
        Self {
            registry: &DEFAULT_REGISTRY,
        }
    }
}

impl<'r> BlockCodec<'r> {
    pub fn new(registry: &'r PayloadRegistry) -> Self {
        Self { registry }
    }

    pub fn serialize_block(&self, block: &Block) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::new();
        self.write_block(block, &mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn deserialize_block(&self, bytes: &[u8]) -> Result<Block> {
        let mut reader = BinaryReader::new(bytes);
        let block = self.read_block(&mut reader)?;
        reader.finish()?;
        Ok(block)
    }

    pub fn serialize_object(&self, object: &BlockObject) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::new();
        self.write_object(object, &mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn deserialize_object(&self, bytes: &[u8]) -> Result<BlockObject> {
        let mut reader = BinaryReader::new(bytes);
        let object = self.read_object(&mut reader)?;
        reader.finish()?;
        Ok(object)
    }

    fn write_block(&self, block: &Block, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_i32(FORMAT_VERSION);
        writer.write_u64(block.get_index());
        writer.write_buffer(block.get_previous_hash())?;
        writer.write_i64(block.get_timestamp());
        writer.write_u64(block.get_nonce());
        writer.write_buffer(block.get_hash())?;

        // An empty list is written as present with zero entries
        writer.write_bool(true);
        writer.write_len(block.get_objects().len())?;
        for object in block.get_objects() {
            self.write_object(object, writer)?;
        }
        Ok(())
    }

    fn read_block(&self, reader: &mut BinaryReader<'_>) -> Result<Block> {
        reader.read_version()?;
        let index = reader.read_u64()?;
        let previous_hash = reader.read_buffer()?;
        let timestamp = reader.read_i64()?;
        let nonce = reader.read_u64()?;
        let hash = reader.read_buffer()?;

        let objects = if reader.read_bool()? {
            let count = reader.read_len()?;
            let mut objects = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                objects.push(self.read_object(reader)?);
            }
            Some(objects)
        } else {
            None
        };

        Ok(Block::from_parts(
            index,
            previous_hash,
            timestamp,
            nonce,
            hash,
            objects,
        ))
    }

    fn write_object(&self, object: &BlockObject, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_i32(FORMAT_VERSION);
        writer.write_string(object.get_source_id())?;
        writer.write_u32(object.get_version());
        writer.write_i64(object.get_timestamp());
        writer.write_buffer(object.get_hash())?;
        self.registry.write(object.get_data(), writer)
    }

    fn read_object(&self, reader: &mut BinaryReader<'_>) -> Result<BlockObject> {
        reader.read_version()?;
        let source_id = reader.read_string()?;
        let version = reader.read_u32()?;
        let timestamp = reader.read_i64()?;
        let hash = reader.read_buffer()?;
        let data = self.registry.read(reader)?;
        Ok(BlockObject::from_parts(
            source_id, version, timestamp, hash, data,
        ))
    }
}

fn encode_transaction(payload: &Payload, writer: &mut BinaryWriter) -> Result<()> {
    let Payload::Transaction(tx) = payload else {
        return Err(BlockchainError::Serialization(format!(
            "Transaction codec given a {} payload",
            payload.kind_name()
        )));
    };
    writer.write_string(tx.get_id())?;
    writer.write_u8(tx.get_type().tag());
    for items in [tx.get_inputs(), tx.get_outputs()] {
        writer.write_len(items.len())?;
        for item in items {
            writer.write_string(item.get_transaction_id())?;
            writer.write_u8(item.get_type().tag());
            writer.write_u32(item.get_index());
            writer.write_u64(item.get_amount());
            writer.write_buffer(item.get_address())?;
            writer.write_opt_buffer(item.get_signature())?;
        }
    }
    Ok(())
}

fn decode_items(reader: &mut BinaryReader<'_>) -> DecodeResult<Vec<TransactionItem>> {
    let count = reader.read_len()?;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let transaction_id = reader.read_string()?;
        let tag = reader.read_u8()?;
        let item_type = ItemType::from_tag(tag).ok_or(DecodeError::InvalidEnumTag {
            kind: "transaction item type",
            tag,
        })?;
        let index = reader.read_u32()?;
        let amount = reader.read_u64()?;
        let address = reader.read_buffer()?;
        let signature = reader.read_opt_buffer()?;
        items.push(TransactionItem::new(
            transaction_id,
            item_type,
            index,
            amount,
            address,
            signature,
        ));
    }
    Ok(items)
}

fn decode_transaction(reader: &mut BinaryReader<'_>) -> DecodeResult<Payload> {
    let id = reader.read_string()?;
    let tag = reader.read_u8()?;
    let tx_type = TransactionType::from_tag(tag).ok_or(DecodeError::InvalidEnumTag {
        kind: "transaction type",
        tag,
    })?;
    let inputs = decode_items(reader)?;
    let outputs = decode_items(reader)?;
    Ok(Payload::Transaction(Transaction::with_id(
        id,
        tx_type,
        TransactionData { inputs, outputs },
    )))
}

fn encode_note(payload: &Payload, writer: &mut BinaryWriter) -> Result<()> {
    let Payload::Note(note) = payload else {
        return Err(BlockchainError::Serialization(format!(
            "Note codec given a {} payload",
            payload.kind_name()
        )));
    };
    writer.write_string(&note.title)?;
    writer.write_opt_string(note.body.as_deref())?;
    writer.write_opt_buffer(note.attachment.as_deref())?;
    writer.write_opt_i64(note.expires_at);
    writer.write_opt_f32(note.weight);
    Ok(())
}

fn decode_note(reader: &mut BinaryReader<'_>) -> DecodeResult<Payload> {
    Ok(Payload::Note(Note {
        title: reader.read_string()?,
        body: reader.read_opt_string()?,
        attachment: reader.read_opt_buffer()?,
        expires_at: reader.read_opt_i64()?,
        weight: reader.read_opt_f32()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::KeyPair;

    fn sample_block(objects: Vec<BlockObject>) -> Block {
        Block::new(7, vec![0xab; 32], 1_700_000_000_000, objects)
    }

    fn signed_transaction() -> Transaction {
        let owner = KeyPair::from_seed(1, &[9u8; 32]).unwrap();
        let mut tx = Transaction::new(TransactionType::Regular);
        tx.add_input("funding", 0, 25, owner.get_public_key())
            .add_output(20, &[1; 32])
            .add_output(5, owner.get_public_key());
        tx.sign_inputs(&owner).unwrap();
        tx
    }

    #[test]
    fn test_round_trip_block_without_objects() {
        let codec = BlockCodec::default();
        let block = sample_block(vec![]);
        let bytes = codec.serialize_block(&block).unwrap();
        assert_eq!(codec.deserialize_block(&bytes).unwrap(), block);
    }

    #[test]
    fn test_round_trip_block_with_every_payload_kind() {
        let codec = BlockCodec::default();
        let objects = vec![
            BlockObject::new("wallet", 1, 10, Payload::from(signed_transaction())),
            BlockObject::new("vault", 2, 11, Payload::from(Note::new("empty"))),
            BlockObject::new(
                "vault",
                2,
                12,
                Payload::from(
                    Note::new("full")
                        .with_body("hunter2")
                        .with_attachment(vec![0, 1, 2])
                        .with_expiry(-5)
                        .with_weight(1.25),
                ),
            ),
        ];
        let block = sample_block(objects);
        let bytes = codec.serialize_block(&block).unwrap();
        let decoded = codec.deserialize_block(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.compute_hash(), block.compute_hash());
    }

    #[test]
    fn test_record_starts_with_version() {
        let bytes = BlockCodec::default()
            .serialize_block(&sample_block(vec![]))
            .unwrap();
        assert_eq!(&bytes[..4], &FORMAT_VERSION.to_le_bytes());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let codec = BlockCodec::default();
        let mut bytes = codec.serialize_block(&sample_block(vec![])).unwrap();
        bytes[..4].copy_from_slice(&(MAX_FORMAT_VERSION + 1).to_le_bytes());
        assert_eq!(
            codec.deserialize_block(&bytes),
            Err(BlockchainError::Decode(DecodeError::VersionTooNew {
                found: MAX_FORMAT_VERSION + 1,
                supported: MAX_FORMAT_VERSION,
            }))
        );
    }

    #[test]
    fn test_newer_object_version_is_rejected() {
        let codec = BlockCodec::default();
        let object = BlockObject::new("v", 1, 1, Payload::from(Note::new("n")));
        let mut bytes = codec.serialize_object(&object).unwrap();
        bytes[..4].copy_from_slice(&2i32.to_le_bytes());
        assert!(matches!(
            codec.deserialize_object(&bytes),
            Err(BlockchainError::Decode(DecodeError::VersionTooNew { .. }))
        ));
    }

    #[test]
    fn test_absent_object_list_decodes_as_empty() {
        let block = sample_block(vec![]);
        let mut writer = BinaryWriter::new();
        writer.write_i32(FORMAT_VERSION);
        writer.write_u64(block.get_index());
        writer.write_buffer(block.get_previous_hash()).unwrap();
        writer.write_i64(block.get_timestamp());
        writer.write_u64(block.get_nonce());
        writer.write_buffer(block.get_hash()).unwrap();
        writer.write_bool(false);

        let decoded = BlockCodec::default()
            .deserialize_block(&writer.into_bytes())
            .unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.compute_hash().as_slice(), block.get_hash());
    }

    #[test]
    fn test_unknown_payload_type_is_rejected() {
        let mut registry = PayloadRegistry::empty();
        registry.register(TRANSACTION_TYPE_ID, encode_transaction, decode_transaction);
        let object = BlockObject::new("v", 1, 1, Payload::from(Note::new("n")));
        let bytes = BlockCodec::default().serialize_object(&object).unwrap();

        let narrow = BlockCodec::new(&registry);
        assert!(matches!(
            narrow.deserialize_object(&bytes),
            Err(BlockchainError::Decode(DecodeError::UnknownPayloadType(2)))
        ));
        assert!(narrow.serialize_object(&object).is_err());
    }

    #[test]
    fn test_truncated_and_trailing_input() {
        let codec = BlockCodec::default();
        let bytes = codec.serialize_block(&sample_block(vec![])).unwrap();

        assert!(matches!(
            codec.deserialize_block(&bytes[..bytes.len() - 1]),
            Err(BlockchainError::Decode(DecodeError::UnexpectedEof { .. }))
        ));

        let mut longer = bytes.clone();
        longer.push(0);
        assert_eq!(
            codec.deserialize_block(&longer),
            Err(BlockchainError::Decode(DecodeError::TrailingBytes(1)))
        );
    }

    #[test]
    fn test_nullable_primitives_write_only_flag_when_absent() {
        let mut writer = BinaryWriter::new();
        writer.write_opt_string(None).unwrap();
        writer.write_opt_i64(None);
        writer.write_opt_f32(Some(2.5));
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 1 + 1 + 1 + 4);

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_opt_string().unwrap(), None);
        assert_eq!(reader.read_opt_i64().unwrap(), None);
        assert_eq!(reader.read_opt_f32().unwrap(), Some(2.5));
        reader.finish().unwrap();
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_i32(-3);
        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_buffer(), Err(DecodeError::NegativeLength(-3)));
    }
}
