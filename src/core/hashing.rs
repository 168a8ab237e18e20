//! Canonical content hashing
//!
//! Values describe themselves to a [`HashBuilder`] as a type tag plus a set of
//! named fields. The builder sorts the fields by name before digesting, so the
//! digest does not depend on the order fields are declared or visited in.
//! Empty collections are left out entirely, which makes "absent" and "present
//! but empty" indistinguishable to the digest.

use crate::utils::{sha256_digest, Hash};

/// Implemented by every value that has a content address.
pub trait ToHashBytes {
    fn hash_fields(&self, builder: &mut HashBuilder);

    /// Type tag mixed into the digest so two types with identical fields differ.
    fn type_tag(&self) -> &'static str;
}

/// Digest of `value`'s canonical field encoding.
pub fn compute_hash_bytes<T: ToHashBytes + ?Sized>(value: &T) -> Hash {
    let mut builder = HashBuilder::new(value.type_tag());
    value.hash_fields(&mut builder);
    builder.finish()
}

/// Fixed sentinel hashed in place of an empty payload list.
pub struct EmptyMarker;

impl ToHashBytes for EmptyMarker {
    fn hash_fields(&self, _builder: &mut HashBuilder) {}

    fn type_tag(&self) -> &'static str {
        "EmptyMarker"
    }
}

pub struct HashBuilder {
    tag: &'static str,
    fields: Vec<(&'static str, Vec<u8>)>,
}

impl HashBuilder {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            fields: Vec::new(),
        }
    }

    pub fn field_bytes(&mut self, name: &'static str, value: &[u8]) -> &mut Self {
        self.fields.push((name, value.to_vec()));
        self
    }

    pub fn field_str(&mut self, name: &'static str, value: &str) -> &mut Self {
        self.field_bytes(name, value.as_bytes())
    }

    pub fn field_u64(&mut self, name: &'static str, value: u64) -> &mut Self {
        self.field_bytes(name, &value.to_le_bytes())
    }

    pub fn field_i64(&mut self, name: &'static str, value: i64) -> &mut Self {
        self.field_bytes(name, &value.to_le_bytes())
    }

    pub fn field_u32(&mut self, name: &'static str, value: u32) -> &mut Self {
        self.field_bytes(name, &value.to_le_bytes())
    }

    pub fn field_f32(&mut self, name: &'static str, value: f32) -> &mut Self {
        self.field_bytes(name, &value.to_bits().to_le_bytes())
    }

    /// Hashes each element and records the ordered digests. Empty lists are omitted.
    pub fn field_list<T: ToHashBytes>(&mut self, name: &'static str, items: &[T]) -> &mut Self {
        if items.is_empty() {
            return self;
        }
        let mut joined = Vec::with_capacity(items.len() * 32);
        for item in items {
            joined.extend_from_slice(&compute_hash_bytes(item));
        }
        self.field_bytes(name, &joined)
    }

    /// Records a nested value by its digest.
    pub fn field_nested<T: ToHashBytes + ?Sized>(
        &mut self,
        name: &'static str,
        value: &T,
    ) -> &mut Self {
        let digest = compute_hash_bytes(value);
        self.field_bytes(name, &digest)
    }

    pub fn finish(mut self) -> Hash {
        self.fields.sort_by(|a, b| a.0.cmp(b.0));

        let mut encoded = Vec::new();
        push_framed(&mut encoded, self.tag.as_bytes());
        for (name, value) in &self.fields {
            push_framed(&mut encoded, name.as_bytes());
            push_framed(&mut encoded, value);
        }
        sha256_digest(&encoded)
    }
}

fn push_framed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
