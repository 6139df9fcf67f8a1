//! Node families, field descriptors and field visitors

use super::Proof;
use crate::model::{Hash, HashTag};
use crate::ser::{Codec, Decoder, Encoder};
use crate::Result;
use std::fmt;

/// Static description of one field of a node variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Whether the field is itself a commitment node (hashed by its hash)
    pub nested: bool,
}

/// Static description of one variant of a node family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantDescriptor {
    pub name: &'static str,
    /// Label of the per-variant sub-tag; `None` uses the family tag as-is
    pub sub_tag: Option<&'static str>,
    pub fields: &'static [FieldDescriptor],
}

/// A family of commitment node variants
///
/// Implementors describe their variants in `VARIANTS` and walk their fields
/// in declared order in `visit_fields`. Hashing, wire encoding and pruning
/// are all driven from that single walk.
pub trait Node: Sized + Send + Sync + 'static {
    /// Family name used in errors and debug output
    const KIND: &'static str;

    /// Registered variants, in selector order
    const VARIANTS: &'static [VariantDescriptor];

    /// Whether a varuint variant selector precedes the fields on the wire
    const UNION: bool = false;

    /// Family-level domain tag
    fn family_tag() -> HashTag;

    /// Index of this value's variant in `VARIANTS`
    fn variant_index(&self) -> usize {
        0
    }

    /// Visit every field in declared order
    fn visit_fields<V: FieldVisitor>(&self, visitor: &mut V);

    /// Decode the fields of variant `index`
    fn decode_variant(index: usize, dec: &mut Decoder<'_>) -> Result<Self>;

    /// Copy with every nested commitment field pruned
    fn prune_fields(&self) -> Self;

    fn descriptor(&self) -> &'static VariantDescriptor {
        &Self::VARIANTS[self.variant_index()]
    }

    /// Domain tag of this value's variant
    fn tag(&self) -> HashTag {
        let family = Self::family_tag();
        match self.descriptor().sub_tag {
            Some(label) => family.derive(label),
            None => family,
        }
    }
}

/// Receives the fields of a node in declared order
pub trait FieldVisitor {
    /// A plain value field
    fn value<T: Codec + fmt::Debug>(&mut self, name: &'static str, value: &T);

    /// A nested commitment field
    fn nested<M: Node>(&mut self, name: &'static str, proof: &Proof<M>);
}

/// Computes `data_hash`: field wire bytes, or nested hashes
pub(crate) struct DataHasher {
    buf: Encoder,
    expected: &'static [FieldDescriptor],
    seen: usize,
}

impl DataHasher {
    pub(crate) fn new(descriptor: &'static VariantDescriptor) -> Self {
        DataHasher {
            buf: Encoder::new(),
            expected: descriptor.fields,
            seen: 0,
        }
    }

    fn check(&mut self, name: &'static str, nested: bool) {
        debug_assert!(
            self.expected.get(self.seen) == Some(&FieldDescriptor { name, nested }),
            "field {:?} (nested: {}) visited out of declared order",
            name,
            nested
        );
        self.seen += 1;
    }

    pub(crate) fn finish(self) -> Hash {
        debug_assert_eq!(
            self.seen,
            self.expected.len(),
            "not every declared field was visited"
        );
        Hash::digest(self.buf.as_bytes())
    }
}

impl FieldVisitor for DataHasher {
    fn value<T: Codec + fmt::Debug>(&mut self, name: &'static str, value: &T) {
        self.check(name, false);
        value.encode(&mut self.buf);
    }

    fn nested<M: Node>(&mut self, name: &'static str, proof: &Proof<M>) {
        self.check(name, true);
        self.buf.write_bytes(proof.hash().as_bytes());
    }
}

/// Writes fields in wire format
pub(crate) struct WireWriter<'a>(pub(crate) &'a mut Encoder);

impl FieldVisitor for WireWriter<'_> {
    fn value<T: Codec + fmt::Debug>(&mut self, _name: &'static str, value: &T) {
        value.encode(self.0);
    }

    fn nested<M: Node>(&mut self, _name: &'static str, proof: &Proof<M>) {
        proof.encode(self.0);
    }
}

/// Detects whether any nested field is pruned
#[derive(Default)]
pub(crate) struct PrunedScan {
    pub(crate) found: bool,
}

impl FieldVisitor for PrunedScan {
    fn value<T: Codec + fmt::Debug>(&mut self, _name: &'static str, _value: &T) {}

    fn nested<M: Node>(&mut self, _name: &'static str, proof: &Proof<M>) {
        self.found |= proof.is_pruned();
    }
}

/// Formats fields for `Debug`
pub(crate) struct DebugFields<'a, 'b, 'c> {
    pub(crate) builder: &'c mut fmt::DebugStruct<'a, 'b>,
}

impl FieldVisitor for DebugFields<'_, '_, '_> {
    fn value<T: Codec + fmt::Debug>(&mut self, name: &'static str, value: &T) {
        self.builder.field(name, value);
    }

    fn nested<M: Node>(&mut self, name: &'static str, proof: &Proof<M>) {
        self.builder.field(name, proof);
    }
}
