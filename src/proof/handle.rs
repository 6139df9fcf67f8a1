//! Shared, hash-stamped node handles with lazy unpruning

use super::node::{DataHasher, DebugFields, Node, PrunedScan, WireWriter};
use crate::model::Hash;
use crate::ser::{Codec, Decoder, Encoder};
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A commitment node behind a shared, immutable handle
///
/// Cloning is cheap and shares the node. The hash is computed once at
/// construction and never changes, whatever is later pruned.
pub struct Proof<N: Node>(Arc<Inner<N>>);

struct Inner<N: Node> {
    hash: Hash,
    /// Some nested field, at any depth, is pruned
    has_pruned: bool,
    state: State<N>,
}

enum State<N: Node> {
    /// All fields are available
    Present(N),
    /// Only the hash is known
    PrunedDigest,
    /// Pruned copy of a node that is still reachable in this process
    ///
    /// `restored` is filled at most once, with the source's contents pruned
    /// one level deep.
    PrunedWithSource {
        source: Proof<N>,
        restored: OnceCell<N>,
    },
}

impl<N: Node> Proof<N> {
    /// Stamp a node with its hash
    pub fn new(node: N) -> Self {
        let mut hasher = DataHasher::new(node.descriptor());
        node.visit_fields(&mut hasher);
        let hash = node.tag().commit(&hasher.finish());

        let mut scan = PrunedScan::default();
        node.visit_fields(&mut scan);

        Proof(Arc::new(Inner {
            hash,
            has_pruned: scan.found,
            state: State::Present(node),
        }))
    }

    /// A fully pruned node known only by its hash
    pub fn from_digest(hash: Hash) -> Self {
        Proof(Arc::new(Inner {
            hash,
            has_pruned: true,
            state: State::PrunedDigest,
        }))
    }

    pub fn hash(&self) -> Hash {
        self.0.hash
    }

    /// Create a pruned version of this node
    ///
    /// The result has the same hash and no readable fields. While `self` (or
    /// its original) stays alive, [`Proof::open`] on the pruned copy restores
    /// exactly the nodes that are looked at.
    pub fn prune(&self) -> Self {
        let source = match &self.0.state {
            State::PrunedDigest => return self.clone(),
            State::Present(_) => self.clone(),
            State::PrunedWithSource { source, .. } => source.clone(),
        };
        Proof(Arc::new(Inner {
            hash: self.0.hash,
            has_pruned: true,
            state: State::PrunedWithSource {
                source,
                restored: OnceCell::new(),
            },
        }))
    }

    /// Access the node's fields, unpruning it if needed
    ///
    /// `field` names what the caller is after and is reported if the node
    /// was pruned with no original to restore from.
    pub fn open(&self, field: &'static str) -> Result<&N> {
        match &self.0.state {
            State::Present(node) => Ok(node),
            State::PrunedDigest => Err(Error::Pruned {
                field,
                kind: N::KIND,
                hash: self.0.hash,
            }),
            State::PrunedWithSource { source, restored } => restored.get_or_try_init(|| {
                let original = source.open(field)?;
                trace!(
                    kind = N::KIND,
                    field,
                    hash = %self.0.hash.short(),
                    "unpruning from source"
                );
                Ok(original.prune_fields())
            }),
        }
    }

    /// The node's fields if available locally, without unpruning
    pub fn peek(&self) -> Option<&N> {
        match &self.0.state {
            State::Present(node) => Some(node),
            State::PrunedDigest => None,
            State::PrunedWithSource { restored, .. } => restored.get(),
        }
    }

    /// True if this node or anything below it has been pruned
    pub fn is_pruned(&self) -> bool {
        self.0.has_pruned || !matches!(self.0.state, State::Present(_))
    }

    /// True if none of this node's fields are available locally
    pub fn is_fully_pruned(&self) -> bool {
        self.peek().is_none()
    }

    /// Name of the node's variant, if its fields are available locally
    pub fn variant_name(&self) -> Option<&'static str> {
        self.peek().map(|node| node.descriptor().name)
    }

    /// True if both handles point to the same node instance
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<N: Node> Clone for Proof<N> {
    fn clone(&self) -> Self {
        Proof(Arc::clone(&self.0))
    }
}

impl<N: Node> PartialEq for Proof<N> {
    fn eq(&self, other: &Self) -> bool {
        self.0.hash == other.0.hash
    }
}

impl<N: Node> Eq for Proof<N> {}

impl<N: Node> std::hash::Hash for Proof<N> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.0.hash, state);
    }
}

impl<N: Node> Codec for Proof<N> {
    fn encode(&self, enc: &mut Encoder) {
        match self.peek() {
            Some(node) => {
                enc.write_bool(false);
                if N::UNION {
                    enc.write_varuint(node.variant_index() as u64);
                }
                node.visit_fields(&mut WireWriter(enc));
            }
            None => {
                enc.write_bool(true);
                enc.write_bytes(self.0.hash.as_bytes());
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.nested(|dec| {
            if dec.read_bool()? {
                return Ok(Proof::from_digest(dec.read()?));
            }

            let index = if N::UNION { dec.read_varuint()? } else { 0 };
            if index >= N::VARIANTS.len() as u64 {
                return Err(Error::UnknownVariant {
                    family: N::KIND,
                    index,
                    count: N::VARIANTS.len(),
                });
            }
            Ok(Proof::new(N::decode_variant(index as usize, dec)?))
        })
    }
}

impl<N: Node> fmt::Debug for Proof<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(node) => {
                let mut builder = f.debug_struct(node.descriptor().name);
                node.visit_fields(&mut DebugFields {
                    builder: &mut builder,
                });
                builder.finish()
            }
            None => write!(f, "Pruned({})", self.0.hash.short()),
        }
    }
}
