//! Trie node types

use crate::bits::Bits;
use crate::model::HashTag;
use crate::proof::{FieldDescriptor, FieldVisitor, Node, Proof, VariantDescriptor};
use crate::ser::{Codec, Decoder};
use crate::{Error, Result};
use bytes::Bytes;
use std::fmt::Debug;
use tracing::debug;

/// Type-level configuration of a merbinner tree
pub trait TreeParams: Send + Sync + 'static {
    type Key: Codec + Clone + Eq + Debug + Send + Sync + 'static;
    type Value: Codec + Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Label the family tag is derived from
    const TAG: &'static str;

    /// Path of a key through the tree
    ///
    /// No key's prefix may be a prefix of another key's.
    fn key_prefix(key: &Self::Key) -> Bits;
}

/// A node of a merbinner tree
///
/// Inner nodes always carry the longest prefix shared by everything below
/// them; the left child continues that prefix with a 0 bit, the right child
/// with a 1 bit.
pub enum TrieNode<P: TreeParams> {
    Empty,
    Leaf {
        key: P::Key,
        value: P::Value,
    },
    Inner {
        prefix: Bits,
        left: Proof<TrieNode<P>>,
        right: Proof<TrieNode<P>>,
    },
}

/// A merbinner tree: a handle to its root node
pub type MerbinnerTree<P> = Proof<TrieNode<P>>;

const EMPTY: usize = 0;
const LEAF: usize = 1;
const INNER: usize = 2;

impl<P: TreeParams> Node for TrieNode<P> {
    const KIND: &'static str = "MerbinnerTree";
    const UNION: bool = true;
    const VARIANTS: &'static [VariantDescriptor] = &[
        VariantDescriptor {
            name: "Empty",
            sub_tag: Some("empty"),
            fields: &[],
        },
        VariantDescriptor {
            name: "Leaf",
            sub_tag: Some("leaf"),
            fields: &[
                FieldDescriptor {
                    name: "key",
                    nested: false,
                },
                FieldDescriptor {
                    name: "value",
                    nested: false,
                },
            ],
        },
        VariantDescriptor {
            name: "Inner",
            sub_tag: Some("inner"),
            fields: &[
                FieldDescriptor {
                    name: "prefix",
                    nested: false,
                },
                FieldDescriptor {
                    name: "left",
                    nested: true,
                },
                FieldDescriptor {
                    name: "right",
                    nested: true,
                },
            ],
        },
    ];

    fn family_tag() -> HashTag {
        HashTag::new(P::TAG)
    }

    fn variant_index(&self) -> usize {
        match self {
            TrieNode::Empty => EMPTY,
            TrieNode::Leaf { .. } => LEAF,
            TrieNode::Inner { .. } => INNER,
        }
    }

    fn visit_fields<V: FieldVisitor>(&self, visitor: &mut V) {
        match self {
            TrieNode::Empty => {}
            TrieNode::Leaf { key, value } => {
                visitor.value("key", key);
                visitor.value("value", value);
            }
            TrieNode::Inner {
                prefix,
                left,
                right,
            } => {
                visitor.value("prefix", prefix);
                visitor.nested("left", left);
                visitor.nested("right", right);
            }
        }
    }

    fn decode_variant(index: usize, dec: &mut Decoder<'_>) -> Result<Self> {
        match index {
            EMPTY => Ok(TrieNode::Empty),
            LEAF => Ok(TrieNode::Leaf {
                key: dec.read()?,
                value: dec.read()?,
            }),
            INNER => {
                let prefix: Bits = dec.read()?;
                let left: MerbinnerTree<P> = dec.read()?;
                let right: MerbinnerTree<P> = dec.read()?;
                check_child(&prefix, &left, false)?;
                check_child(&prefix, &right, true)?;
                Ok(TrieNode::Inner {
                    prefix,
                    left,
                    right,
                })
            }
            _ => Err(Error::UnknownVariant {
                family: Self::KIND,
                index: index as u64,
                count: Self::VARIANTS.len(),
            }),
        }
    }

    fn prune_fields(&self) -> Self {
        match self {
            TrieNode::Empty => TrieNode::Empty,
            TrieNode::Leaf { key, value } => TrieNode::Leaf {
                key: key.clone(),
                value: value.clone(),
            },
            TrieNode::Inner {
                prefix,
                left,
                right,
            } => TrieNode::Inner {
                prefix: prefix.clone(),
                left: left.prune(),
                right: right.prune(),
            },
        }
    }
}

/// Check a decoded child against its parent's prefix, if the child is visible
///
/// A visible child must be non-empty, strictly extend the parent prefix, and
/// continue it with the bit matching its side.
fn check_child<P: TreeParams>(prefix: &Bits, child: &MerbinnerTree<P>, right: bool) -> Result<()> {
    let child_prefix = match child.peek() {
        None => return Ok(()),
        Some(TrieNode::Empty) => {
            debug!(prefix = %prefix, "empty child under inner node");
            return Err(Error::Malformed("empty child under inner trie node".into()));
        }
        Some(TrieNode::Leaf { key, .. }) => P::key_prefix(key),
        Some(TrieNode::Inner { prefix: inner, .. }) => inner.clone(),
    };

    if child_prefix.len() <= prefix.len()
        || !child_prefix.starts_with(prefix)
        || child_prefix.bit(prefix.len()) != right
    {
        debug!(
            prefix = %prefix,
            child = %child_prefix,
            right,
            "child does not extend inner node prefix"
        );
        return Err(Error::Malformed(format!(
            "child prefix {} does not extend inner prefix {} on the {} side",
            child_prefix,
            prefix,
            if right { "right" } else { "left" }
        )));
    }
    Ok(())
}

/// Map from 32-byte digests to `u64`, keyed directly by the digest's bits
pub struct DigestMap;

impl TreeParams for DigestMap {
    type Key = [u8; 32];
    type Value = u64;

    const TAG: &'static str = "proofmarshal.DigestMap";

    fn key_prefix(key: &[u8; 32]) -> Bits {
        Bits::from_whole_bytes(Bytes::copy_from_slice(key))
    }
}
